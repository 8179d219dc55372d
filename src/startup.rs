use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::SessionEngine;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, protected_resource, refresh, register};

pub fn run(listener: TcpListener, engine: SessionEngine) -> Result<Server, std::io::Error> {
    let issuer = engine.issuer().clone();
    let engine = web::Data::new(engine);

    let server = HttpServer::new(move || {
        // Malformed JSON bodies get the same error shape as every other 400
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            AppError::Validation(ValidationError::InvalidFormat(format!("request body ({})", err)))
                .into()
        });

        App::new()
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(engine.clone())
            .app_data(json_config)
            .route("/health_check", web::get().to(health_check))
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::get().to(refresh))
            .service(
                web::resource("/protected-resource")
                    .wrap(JwtMiddleware::new(issuer.clone()))
                    .route(web::get().to(protected_resource)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
