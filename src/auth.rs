use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use std::future::{ready, Ready};

use crate::routes::AppState;

/// Proof that the caller presented the shared intake token (or that none is configured).
#[derive(Debug, Clone, Copy)]
pub struct Intake;

fn token_matches(expected: &str, given: &str) -> bool {
    // constant-time over equal lengths
    expected.len() == given.len()
        && expected.bytes().zip(given.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

impl FromRequest for Intake {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let expected = req
            .app_data::<web::Data<AppState>>()
            .and_then(|s| s.intake_token.clone());
        let Some(expected) = expected else {
            return ready(Ok(Intake));
        };
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            if token_matches(&expected, bearer.token()) {
                return ready(Ok(Intake));
            }
            return ready(Err(actix_web::error::ErrorUnauthorized("Invalid intake token")));
        }
        ready(Err(actix_web::error::ErrorUnauthorized("Authorization required")))
    }
}
