use crate::errors::AppError;

/// Geospatial relationships supported by entity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoRelation {
    Near,
    Within,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Point,
    Polygon,
}

/// A parsed geo query: `near` a point within a maximum distance, or `within`
/// an axis-aligned bounding rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoQuery {
    pub relation: GeoRelation,
    pub geometry: Geometry,
    pub coordinates: Vec<f64>,
    distance: u32,
}

impl GeoQuery {
    /// Build a geo query from the `georel`, `geometry`, `maxDistance` and
    /// `coordinates` request parameters.
    ///
    /// `maxDistance` is transported with an embedded `=` (`maxDistance==2000`)
    /// by NGSI-LD clients; a single leading `=` is stripped before parsing,
    /// so the plain form is accepted as well.
    pub fn from_parameters(
        georel: &str,
        geometry: Option<&str>,
        max_distance: Option<&str>,
        coordinates: Option<&str>,
    ) -> Result<Self, AppError> {
        match georel {
            "near" => {
                if geometry != Some("Point") {
                    return Err(AppError::BadRequestData(
                        "the geospatial relationship near is only defined for the geometry type Point".to_string(),
                    ));
                }

                let distance_param = max_distance.filter(|d| !d.is_empty()).ok_or_else(|| {
                    AppError::BadRequestData(
                        "required parameter maxDistance missing or invalid".to_string(),
                    )
                })?;
                let distance_param = distance_param.strip_prefix('=').unwrap_or(distance_param);

                if distance_param.starts_with('-') {
                    return Err(AppError::BadRequestData(
                        "distance value must be non negative".to_string(),
                    ));
                }

                let distance = distance_param.parse::<u32>().map_err(|e| {
                    AppError::BadRequestData(format!("failed to parse distance: {}", e))
                })?;

                let coordinates = parse_coordinates(coordinates.unwrap_or_default())?;
                if coordinates.len() != 2 {
                    return Err(AppError::BadRequestData(
                        "a near query requires exactly one position for its Point geometry".to_string(),
                    ));
                }

                Ok(GeoQuery {
                    relation: GeoRelation::Near,
                    geometry: Geometry::Point,
                    coordinates,
                    distance,
                })
            }
            "within" => {
                if geometry != Some("Polygon") {
                    return Err(AppError::BadRequestData(
                        "the geospatial relationship within is only defined for the geometry type Polygon".to_string(),
                    ));
                }

                let mut coordinates = parse_coordinates(coordinates.unwrap_or_default())?;
                if coordinates.len() != 10 {
                    return Err(AppError::BadRequestData(
                        "a within query requires a closed ring of exactly five positions".to_string(),
                    ));
                }

                // Only the three independent corners of the closing ring are
                // kept; the rect is spanned by positions 0 and 2.
                coordinates.truncate(6);

                Ok(GeoQuery {
                    relation: GeoRelation::Within,
                    geometry: Geometry::Polygon,
                    coordinates,
                    distance: 0,
                })
            }
            other => Err(AppError::BadRequestData(format!(
                "unsupported geospatial relationship: {}",
                other
            ))),
        }
    }

    // Only tests decompose the parsed state; the dispatcher validates the
    // parameters here and forwards the original query string untouched.

    /// The maximum distance in meters for a `near` query.
    #[cfg(test)]
    pub fn distance(&self) -> u32 {
        self.distance
    }

    /// The single position of a Point geometry.
    #[cfg(test)]
    pub fn point(&self) -> (f64, f64) {
        (self.coordinates[0], self.coordinates[1])
    }

    /// The corners of the bounding rectangle of a `within` query, taken from
    /// positions 0 and 2 of the stored ring.
    #[cfg(test)]
    pub fn rect(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.coordinates[0], self.coordinates[1]),
            (self.coordinates[4], self.coordinates[5]),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordState {
    Init,
    PreLon,
    LonInt,
    LonDec,
    PreLat,
    LatInt,
    LatDec,
}

/// Parse a bracket-nested coordinate parameter such as `[[2.4,2.1],[3.3,3.7]]`
/// (or a single `[lon,lat]` pair) into a flat lon/lat list.
///
/// The input is walked byte by byte; only ASCII digits, `.`, `,`, `[` and `]`
/// are accepted. Numbers are assembled by integer accumulation and a
/// decreasing decimal factor. Errors report the offending byte index.
pub fn parse_coordinates(input: &str) -> Result<Vec<f64>, AppError> {
    use CoordState::*;

    if input.is_empty() {
        return Err(AppError::BadRequestData(
            "geometry coordinates must be enclosed in brackets".to_string(),
        ));
    }

    let mut state = Init;
    let mut depth = 0u32;
    let mut coordinates = Vec::new();
    let mut lon = 0.0f64;
    let mut lat = 0.0f64;
    let mut factor = 0.1f64;

    let syntax_error = |byte: u8, index: usize| {
        AppError::BadRequestData(format!(
            "unexpected character '{}' at position {} in coordinate parameter",
            byte as char, index
        ))
    };

    for (index, byte) in input.bytes().enumerate() {
        match byte {
            b'[' => match state {
                Init => {
                    depth = 1;
                    state = PreLon;
                }
                PreLon if depth > 0 => depth += 1,
                _ => return Err(syntax_error(byte, index)),
            },
            b']' => match state {
                LatInt | LatDec => {
                    coordinates.push(lon);
                    coordinates.push(lat);
                    lon = 0.0;
                    lat = 0.0;
                    depth -= 1;
                    state = PreLon;
                }
                PreLon if depth > 0 => depth -= 1,
                _ => return Err(syntax_error(byte, index)),
            },
            b',' => match state {
                LonInt | LonDec => state = PreLat,
                PreLon if depth > 0 => {}
                _ => return Err(syntax_error(byte, index)),
            },
            b'.' => match state {
                LonInt => {
                    factor = 0.1;
                    state = LonDec;
                }
                LatInt => {
                    factor = 0.1;
                    state = LatDec;
                }
                _ => return Err(syntax_error(byte, index)),
            },
            b'0'..=b'9' => {
                let digit = f64::from(byte - b'0');
                match state {
                    PreLon if depth > 0 => {
                        lon = digit;
                        state = LonInt;
                    }
                    LonInt => lon = lon * 10.0 + digit,
                    LonDec => {
                        lon += digit * factor;
                        factor /= 10.0;
                    }
                    PreLat => {
                        lat = digit;
                        state = LatInt;
                    }
                    LatInt => lat = lat * 10.0 + digit,
                    LatDec => {
                        lat += digit * factor;
                        factor /= 10.0;
                    }
                    _ => return Err(syntax_error(byte, index)),
                }
            }
            _ => return Err(syntax_error(byte, index)),
        }
    }

    if depth != 0 || state != PreLon {
        return Err(AppError::BadRequestData(
            "unbalanced brackets in coordinate parameter".to_string(),
        ));
    }

    Ok(coordinates)
}
