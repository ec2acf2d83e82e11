#![forbid(unsafe_code)]

use anyhow::Result;
use log::info;
use poem::listener::{BoxListener, Listener, RustlsCertificate, RustlsConfig, TcpListener};

// Greeting Utilities
use crate::api::build_app;
use crate::utils::config::{
    get_root_dir, init_dirs, init_log, init_runtime_context, Config, GreetingDirs, RuntimeCtx,
    GREETING_ARGS,
};
use crate::utils::errors::Errors;

// Modules
mod api;
mod utils;

// ***************************************************************************
//                                Constants
// ***************************************************************************
const SERVER_NAME : &str = "GreetingServer"; // for poem logging
const CERT_FILE   : &str = "/cert.pem";      // relative to certs dir
const KEY_FILE    : &str = "/key.pem";       // relative to certs dir

// ---------------------------------------------------------------------------
// main:
// ---------------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<()> {
    // --------------- Initialize Server --------------
    // Announce ourselves.
    println!("Starting greeting_server!");

    // Initialize the server or exit if only the directories were requested.
    let ctx = match greeting_init()? {
        Some(ctx) => ctx,
        None => return Ok(()),
    };

    // --------------- Main Loop Set Up ---------------
    let config = &ctx.parms.config;
    let app = build_app(&config.greeting_values(), &config.title, &config.server_url());
    let addr = format!("{}{}", "0.0.0.0:", config.http_port);
    let listener = get_listener(config, &ctx.dirs, &addr)?;
    info!("{} listening on {} (tls={}).", SERVER_NAME, addr, config.http_tls);

    // ------------------ Main Loop -------------------
    poem::Server::new(listener)
        .name(SERVER_NAME)
        .run(app)
        .await?;
    Ok(())
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// greeting_init:
// ---------------------------------------------------------------------------
/** Initialize all subsystems and data structures other than those needed
 * to configure the main loop processor.  Returns None when the command line
 * only asked for the data directories to be created.
 */
fn greeting_init() -> Result<Option<RuntimeCtx>> {
    // Resolve and create the data directories first; logging depends on them.
    let args = &*GREETING_ARGS;
    let dirs = init_dirs(&get_root_dir(args))?;
    if args.create_dirs_only {
        println!("Data directories created under {}.", dirs.root_dir);
        return Ok(None);
    }

    // Configure our log.
    init_log(&dirs)?;

    // Read the input parameters once; they are immutable from here on.
    let ctx = init_runtime_context(args, dirs)?;
    info!("{}", Errors::InputParms(format!("{:#?}", ctx)));

    // Log build info.
    print_version_info();

    Ok(Some(ctx))
}

// ---------------------------------------------------------------------------
// get_listener:
// ---------------------------------------------------------------------------
/** Plain TCP unless TLS is configured, in which case the certificate and key
 * must exist in the certs directory.
 */
fn get_listener(config: &Config, dirs: &GreetingDirs, addr: &str) -> Result<BoxListener> {
    let listener = TcpListener::bind(addr.to_string());
    if !config.http_tls {
        return Ok(listener.boxed());
    }

    let cert = read_tls_file(dirs.certs_dir.clone() + CERT_FILE)?;
    let key = read_tls_file(dirs.certs_dir.clone() + KEY_FILE)?;
    Ok(listener
        .rustls(RustlsConfig::new().fallback(RustlsCertificate::new().key(key).cert(cert)))
        .boxed())
}

// ---------------------------------------------------------------------------
// read_tls_file:
// ---------------------------------------------------------------------------
fn read_tls_file(path: String) -> Result<Vec<u8>> {
    match std::fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) => Err(Errors::TLSFileError(path, e.to_string()).into()),
    }
}

// ---------------------------------------------------------------------------
// print_version_info:
// ---------------------------------------------------------------------------
fn print_version_info() {
    info!("\n*** Running GREETING_SERVER={}, BRANCH={}, COMMIT={}, DIRTY={}, RUSTC={}.",
          option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
          env!("GIT_BRANCH"),
          env!("GIT_COMMIT_SHORT"),
          env!("GIT_DIRTY"),
          env!("RUSTC_VERSION"),
    );
}
