use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::CredentialService;
use crate::middleware::JwtMiddleware;
use crate::routes::{authenticate, health_check, provide, refresh, registrate, session};

pub fn run(listener: TcpListener, service: CredentialService) -> Result<Server, std::io::Error> {
    let codec = service.codec().clone();
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(service.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/registrate", web::post().to(registrate))
            .route("/authenticate", web::post().to(authenticate))
            .route("/provide/{id}", web::get().to(provide))
            // Refresh stays outside the middleware: the access token may already be expired.
            .route("/refresh/{id}", web::get().to(refresh))
            // Protected routes
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route("/session", web::get().to(session)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
