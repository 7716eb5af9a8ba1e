mod config;
mod errors;
mod geo;
mod geojson;
mod models;
mod query;
mod registry;
mod request;
mod routes;
mod sources;
mod validation;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use utoipa::openapi::Server;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::API_PREFIX;
use crate::registry::ContextRegistry;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "NGSI-LD Context Broker",
        description = "Federating NGSI-LD context broker. Context sources advertise the \
            entity types, attributes and id patterns they serve; the broker routes entity \
            creations, retrievals, queries and partial updates to every matching source \
            and concatenates the results.",
        version = "1.0.0"
    ),
    paths(
        routes::health::health,
        routes::registrations::register_context_source,
        routes::entities::create_entity,
        routes::entities::query_entities,
        routes::entities::retrieve_entity,
        routes::entities::update_entity_attributes,
    ),
    components(schemas(
        models::ContextSourceRegistration, models::RegistrationInfo, models::EntityInfo,
        models::RegisteredSource, models::HealthPayload,
    )),
    tags(
        (name = "System", description = "Health and status"),
        (name = "Registrations", description = "Context source advertisements"),
        (name = "Entities", description = "Federated NGSI-LD entity operations"),
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
    let cfg = config::Config::from_env();

    let registry = web::Data::new(ContextRegistry::new());
    let client = web::Data::new(reqwest::Client::new());

    let bind = format!("{}:{}", cfg.host, cfg.port);
    log::info!("Starting NGSI-LD context broker on {bind}");
    log::info!("Swagger UI: http://{bind}{API_PREFIX}/docs/");

    let mut openapi = ApiDoc::openapi();
    openapi.servers = Some(vec![Server::new(API_PREFIX)]);

    let openapi_url: &'static str = Box::leak(format!("{API_PREFIX}/openapi.json").into_boxed_str());
    let docs_path: &'static str = Box::leak(format!("{API_PREFIX}/docs/{{_:.*}}").into_boxed_str());

    HttpServer::new(move || {
        App::new()
            .wrap(
                Logger::new(r#"%a "%r" %s %b %Dms "%{User-Agent}i""#)
                    .exclude("/ngsi-ld/v1/health"),
            )
            .wrap(Cors::permissive())
            .app_data(registry.clone())
            .app_data(client.clone())
            .service(SwaggerUi::new(docs_path).url(openapi_url, openapi.clone()))
            .service(web::scope(API_PREFIX).configure(routes::configure_routes))
    })
    .bind(&bind)?
    .run()
    .await
}
