#![forbid(unsafe_code)]

use poem_openapi::{OpenApi, payload::PlainText};

const STATUS_BODY: &str = "All Ok";

pub struct StatusApi;

#[OpenApi]
impl StatusApi {
    #[oai(path = "/something", method = "get")]
    async fn something(&self) -> PlainText<String> {
        PlainText(STATUS_BODY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_all_ok() {
        assert_eq!(StatusApi.something().await.0, "All Ok");
    }
}
