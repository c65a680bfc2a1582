use std::any::Any;

use axum::{http::StatusCode, response::Response};
use visuasort_http_errors::ErrorResponseData;

fn panic_message(err: &(dyn Any + Send + 'static)) -> String {
    if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic message".to_string()
    }
}

pub fn handle_panic(production: bool, err: Box<dyn Any + Send + 'static>) -> Response {
    let cause = (!production).then(|| panic_message(err.as_ref()));
    ErrorResponseData::with_cause("panic", "Server error", cause)
        .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_only_outside_production() {
        let res = handle_panic(false, Box::new("worker exploded"));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(panic_message(&String::from("boom")), "boom");
        assert_eq!(panic_message(&5_u32), "Unknown panic message");
    }
}
