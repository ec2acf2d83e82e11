#![forbid(unsafe_code)]

use poem_openapi::{OpenApi, payload::Json, Object};

// From cargo.toml.
const APP_VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

// ***************************************************************************
//                          Request/Response Definitions
// ***************************************************************************
pub struct VersionApi;

#[derive(Object)]
struct RespVersion
{
    result_code: String,
    result_msg: String,
    app_version: String,
    git_branch: String,
    git_commit: String,
    git_dirty: String,
    rustc_version: String,
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl VersionApi {
    #[oai(path = "/version", method = "get")]
    async fn get_version(&self) -> Json<RespVersion> {
        Json(RespVersion::process())
    }
}

// ***************************************************************************
//                          Request/Response Methods
// ***************************************************************************
impl RespVersion {
    fn new(result_code: &str, result_msg: &str, version: &str, branch: &str, commit: &str,
           dirty: &str, rustc: &str) -> Self {
        Self {result_code: result_code.to_string(),
              result_msg: result_msg.to_string(),
              app_version: version.to_string(),
              git_branch: branch.to_string(),
              git_commit: commit.to_string(),
              git_dirty:  dirty.to_string(),
              rustc_version: rustc.to_string(),
        }
    }

    // Values are fixed at build time by build.rs.
    fn process() -> RespVersion {
        Self::new("0",
                  "success",
                  APP_VERSION.unwrap_or("unknown"),
                  env!("GIT_BRANCH"),
                  env!("GIT_COMMIT_SHORT"),
                  env!("GIT_DIRTY"),
                  env!("RUSTC_VERSION"))
    }
}
