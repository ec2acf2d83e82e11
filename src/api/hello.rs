#![forbid(unsafe_code)]

use log::debug;
use poem_openapi::{OpenApi, payload::PlainText};

use crate::utils::config::GreetingValues;

// Every greeting starts with this text.
const GREETING_PREFIX: &str = "Greetings from ";

// ***************************************************************************
//                          Request/Response Definitions
// ***************************************************************************
/// Serves the greeting composed from the configuration values.  The text is
/// built once at construction since the values never change afterwards.
pub struct HelloApi {
    greeting: String,
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl HelloApi {
    #[oai(path = "/", method = "get")]
    async fn index(&self) -> PlainText<String> {
        debug!("Greeting requested: {}", self.greeting);
        PlainText(self.greeting.clone())
    }
}

// ***************************************************************************
//                              Public Methods
// ***************************************************************************
impl HelloApi {
    pub fn new(values: &GreetingValues) -> Self {
        Self { greeting: compose_greeting(&values.name, values.test_value.as_deref()) }
    }
}

// ---------------------------------------------------------------------------
// compose_greeting:
// ---------------------------------------------------------------------------
/** Build "Greetings from {name}!" or, when a test value is present,
 * "Greetings from {name} {test_value}!".
 */
pub fn compose_greeting(name: &str, test_value: Option<&str>) -> String {
    match test_value {
        Some(value) => format!("{}{} {}!", GREETING_PREFIX, name, value),
        None => format!("{}{}!", GREETING_PREFIX, name),
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;

    fn values(name: &str, test_value: Option<&str>) -> GreetingValues {
        GreetingValues { name: name.to_string(), test_value: test_value.map(str::to_string) }
    }

    #[test]
    fn greeting_with_test_value() {
        assert_eq!(compose_greeting("demo", Some("v1")), "Greetings from demo v1!");
    }

    #[test]
    fn greeting_without_test_value() {
        assert_eq!(compose_greeting("demo", None), "Greetings from demo!");
    }

    #[test]
    fn values_are_not_trimmed() {
        assert_eq!(compose_greeting(" my app ", Some("a b")), "Greetings from  my app  a b!");
    }

    #[tokio::test]
    async fn index_returns_bound_greeting() {
        let api = HelloApi::new(&values("demo", Some("v1")));
        assert_eq!(api.index().await.0, "Greetings from demo v1!");
        // Repeated calls give the same answer.
        assert_eq!(api.index().await.0, "Greetings from demo v1!");
    }
}
