#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use log::{info, error, LevelFilter};
use serde::Deserialize;
use std::{env, fs, path::Path};
use fs_mistrust::Mistrust;
use std::os::unix::fs::PermissionsExt;
use lazy_static::lazy_static;
use structopt::StructOpt;

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

// Greeting Utilities
use crate::utils::{errors::Errors, greeting_utils::{get_absolute_path, non_empty}};

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Directory and file locations. Unless otherwise noted, all files and directories
// are relative to the root directory.
const ENV_ROOT_DIR         : &str = "GREETING_ROOT_DIR";
const DEFAULT_ROOT_DIR     : &str = "~/.greeting_server";
const CONFIG_DIR           : &str = "/config";
const LOGS_DIR             : &str = "/logs";
const CERTS_DIR            : &str = "/certs";
const LOG4RS_CONFIG_FILE   : &str = "/log4rs.yml";    // relative to config dir
const GREETING_CONFIG_FILE : &str = "/greeting.toml"; // relative to config dir

// Environment overrides applied on top of the configuration file.
pub const ENV_APP_NAME     : &str = "GREETING_APP_NAME";
pub const ENV_TEST_VALUE   : &str = "GREETING_TEST_VALUE";
pub const ENV_HTTP_PORT    : &str = "GREETING_HTTP_PORT";

// Networking.
const DEFAULT_HTTP_HOST    : &str = "localhost";
const DEFAULT_HTTP_PORT    : u16  = 8080;

// Substituted when no application name is configured.
pub const DEFAULT_APP_NAME : &str = env!("CARGO_PKG_NAME");

// Console layout used when no log4rs file is installed.
const DEFAULT_LOG_PATTERN  : &str = "{d(%Y-%m-%dT%H:%M:%S%.3fZ)(utc)} {h({l})} {M} - {m}{n}";

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Assign the command line arguments BEFORE the runtime context is built in main.
lazy_static! {
    pub static ref GREETING_ARGS: GreetingArgs = init_args();
}

// ***************************************************************************
//                             Directory Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// GreetingDirs:
// ---------------------------------------------------------------------------
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct GreetingDirs {
    pub root_dir: String,
    pub config_dir: String,
    pub logs_dir: String,
    pub certs_dir: String,
}

// ***************************************************************************
//                               Config Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// GreetingArgs:
// ---------------------------------------------------------------------------
#[derive(Debug, StructOpt)]
#[structopt(name = "greeting_args", about = "Command line arguments for the greeting server.")]
pub struct GreetingArgs {
    /// Specify the server's root data directory.
    ///
    /// This directory contains the config, logs and certs subdirectories.
    #[structopt(short, long)]
    pub root_dir: Option<String>,

    /// Create the data directories and then exit.
    ///
    /// The data directories will be rooted at a root directory calculated
    /// using the following priority order:
    ///
    ///   1. If set, the value of the GREETING_ROOT_DIR environment,
    ///
    ///   2. Otherwise, if set, the value of the --root-dir command line argument,
    ///
    ///   3. Otherwise, ~/.greeting_server
    ///
    #[structopt(short, long)]
    pub create_dirs_only: bool,
}

// ---------------------------------------------------------------------------
// Parms:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct Parms {
    pub config_file: String,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// RuntimeCtx:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct RuntimeCtx {
    pub parms: Parms,
    pub args: &'static GreetingArgs,
    pub dirs: GreetingDirs,
}

// ---------------------------------------------------------------------------
// Config:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub title: String,
    pub app_name: Option<String>,
    pub test_value: Option<String>,
    pub http_addr: Option<String>,
    pub http_port: u16,
    pub http_tls: bool,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /// Resolve the values interpolated into the greeting.  Empty settings
    /// count as missing; a missing name falls back to the package name.
    pub fn greeting_values(&self) -> GreetingValues {
        GreetingValues {
            name: non_empty(self.app_name.clone()).unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            test_value: non_empty(self.test_value.clone()),
        }
    }

    /// The base URL advertised in the OpenAPI document.  Without an explicit
    /// address the scheme follows http_tls.
    pub fn server_url(&self) -> String {
        match non_empty(self.http_addr.clone()) {
            Some(addr) => format!("{}:{}", addr, self.http_port),
            None => {
                let scheme = if self.http_tls {"https"} else {"http"};
                format!("{}://{}:{}", scheme, DEFAULT_HTTP_HOST, self.http_port)
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Greeting Server".to_string(),
            app_name: None,
            test_value: None,
            http_addr: None,
            http_port: DEFAULT_HTTP_PORT,
            http_tls: false,
        }
    }
}

// ---------------------------------------------------------------------------
// GreetingValues:
// ---------------------------------------------------------------------------
/// The read-only configuration values bound into the greeting responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingValues {
    pub name: String,
    pub test_value: Option<String>,
}

// ***************************************************************************
//                            Directory Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_args:
// ---------------------------------------------------------------------------
/** Get the command line arguments. */
fn init_args() -> GreetingArgs {
    let args = GreetingArgs::from_args();
    println!("{:?}", args);
    args
}

// ---------------------------------------------------------------------------
// init_dirs:
// ---------------------------------------------------------------------------
/** Calculate the external data directories, creating any that are missing. */
pub fn init_dirs(root_dir: &str) -> Result<GreetingDirs> {
    if !Path::new(root_dir).is_absolute() {
        return Err(anyhow!(Errors::InvalidDirectory("root directory".to_string(),
                                                    root_dir.to_string(),
                                                    "the path must be absolute".to_string())));
    }

    // Everything above the root directory is outside our control.
    let mistrust = get_mistrust(root_dir)?;

    // Check that each path is absolute and is a directory with the
    // proper permission assign if it exists.  If it doesn't exist,
    // create it.
    let root_dir = root_dir.to_string();
    check_dir(&root_dir, "root directory", &mistrust)?;

    let config_dir = root_dir.clone() + CONFIG_DIR;
    check_dir(&config_dir, "config directory", &mistrust)?;

    let logs_dir = root_dir.clone() + LOGS_DIR;
    check_dir(&logs_dir, "logs directory", &mistrust)?;

    let certs_dir = root_dir.clone() + CERTS_DIR;
    check_dir(&certs_dir, "certs directory", &mistrust)?;

    Ok(GreetingDirs { root_dir, config_dir, logs_dir, certs_dir })
}

// ---------------------------------------------------------------------------
// check_dir:
// ---------------------------------------------------------------------------
/** Check that the path is absolute and, if it exists, that is has the proper
 * permissions assigned.  If it doesn't exist, create it.  The mistrust package
 * creates directories with 0o700 permissions.
 */
fn check_dir(dir: &str, msgname: &str, mistrust: &Mistrust) -> Result<()> {
    let invalid = |reason: &str| {
        anyhow!(Errors::InvalidDirectory(msgname.to_string(), dir.to_string(), reason.to_string()))
    };

    let path = Path::new(dir);
    if !path.is_absolute() {
        return Err(invalid("the path must be absolute"));
    }
    if path.exists() {
        if !path.is_dir() {
            return Err(invalid("the path must be a directory"));
        }

        // Make sure the directory has rwx for owner only.
        let perm = path.metadata().map_err(Errors::IOError)?.permissions().mode();
        if perm & 0o777 != 0o700 {
            return Err(invalid("the directory must have 0o700 permissions"));
        }
    } else if let Err(e) = mistrust.make_directory(path) {
        return Err(invalid(&format!("make directory error: {}", e)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// get_mistrust:
// ---------------------------------------------------------------------------
/** Configure a new mistrust object that ignores the ancestors of the root
 * directory.
 */
fn get_mistrust(root_dir: &str) -> Result<Mistrust> {
    // The prefix has to exist, so climb to the nearest existing ancestor.
    let mut prefix = Path::new(root_dir).parent().unwrap_or(Path::new("/"));
    while !prefix.exists() {
        match prefix.parent() {
            Some(p) => prefix = p,
            None => break,
        }
    }
    match Mistrust::builder()
        .ignore_prefix(prefix)
        .trust_group(0)
        .build() {
            Ok(m) => Ok(m),
            Err(e) => Err(anyhow!("Mistrust configuration error: {}", e)),
        }
}

// ---------------------------------------------------------------------------
// get_root_dir:
// ---------------------------------------------------------------------------
pub fn get_root_dir(args: &GreetingArgs) -> String {
    resolve_root_dir(args, |key| env::var(key).ok())
}

// ---------------------------------------------------------------------------
// resolve_root_dir:
// ---------------------------------------------------------------------------
fn resolve_root_dir<F>(args: &GreetingArgs, lookup: F) -> String
where F: Fn(&str) -> Option<String>
{
    // Order of precedence:
    //  1. Environment variable
    //  2. Command line --root-dir argument
    //  3. Default location
    //
    let root_dir = lookup(ENV_ROOT_DIR).unwrap_or_else(
        || {
            match args.root_dir.clone() {
                Some(r) => r,
                None => DEFAULT_ROOT_DIR.to_string(),
            }
        });

    // Canonicalize the path.
    get_absolute_path(&root_dir)
}

// ***************************************************************************
//                               Log Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_log:
// ---------------------------------------------------------------------------
/** Initialize log4rs from the config directory's log4rs.yml or, when that
 * file is not installed, with a console appender at info level.
 */
pub fn init_log(dirs: &GreetingDirs) -> Result<()> {
    let logconfig = dirs.config_dir.clone() + LOG4RS_CONFIG_FILE;
    if Path::new(&logconfig).exists() {
        if let Err(e) = log4rs::init_file(&logconfig, Default::default()) {
            return Err(anyhow!("{}\n   {}", Errors::Log4rsInitialization(logconfig), e));
        }
        info!("Log4rs initialized using: {}", logconfig);
        return Ok(());
    }

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(DEFAULT_LOG_PATTERN)))
        .build();
    let logcfg = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .map_err(|e| anyhow!("{}\n   {}", Errors::Log4rsInitialization("console".to_string()), e))?;
    log4rs::init_config(logcfg)
        .map_err(|e| anyhow!("{}\n   {}", Errors::Log4rsInitialization("console".to_string()), e))?;

    info!("Log4rs initialized using the built-in console configuration.");
    Ok(())
}

// ***************************************************************************
//                             Parms Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_parms:
// ---------------------------------------------------------------------------
/** Retrieve the application parameters from the configuration file in the
 * config directory and the process environment.
 */
pub fn get_parms(dirs: &GreetingDirs) -> Result<Parms> {
    load_parms(dirs, |key| env::var(key).ok())
}

// ---------------------------------------------------------------------------
// load_parms:
// ---------------------------------------------------------------------------
/** Read the configuration file, falling back to defaults if it's missing,
 * then apply overrides obtained through the lookup function.
 */
fn load_parms<F>(dirs: &GreetingDirs, lookup: F) -> Result<Parms>
where F: Fn(&str) -> Option<String>
{
    let config_file = get_absolute_path(&(dirs.config_dir.clone() + GREETING_CONFIG_FILE));
    info!("{}", Errors::ReadingConfigFile(config_file.clone()));
    let config = match fs::read_to_string(&config_file) {
        Ok(contents) => parse_config(&contents, &config_file)?,
        Err(_) => {
            info!("Unable to read configuration at {}. Using default values.", config_file);
            Config::new()
        }
    };

    let config = apply_env_overrides(config, lookup)?;
    Ok(Parms { config_file, config })
}

// ---------------------------------------------------------------------------
// parse_config:
// ---------------------------------------------------------------------------
fn parse_config(contents: &str, config_file: &str) -> Result<Config> {
    match toml::from_str(contents) {
        Ok(c)  => Ok(c),
        Err(e) => {
            let msg = format!("{}\n   {}", Errors::TOMLParseError(config_file.to_string()), e);
            error!("{}", msg);
            Err(anyhow!(msg))
        }
    }
}

// ---------------------------------------------------------------------------
// apply_env_overrides:
// ---------------------------------------------------------------------------
/** Environment values take precedence over the configuration file.  An
 * empty variable counts as unset and leaves the file value in place.
 */
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Result<Config>
where F: Fn(&str) -> Option<String>
{
    if let Some(name) = non_empty(lookup(ENV_APP_NAME)) {
        config.app_name = Some(name);
    }
    if let Some(value) = non_empty(lookup(ENV_TEST_VALUE)) {
        config.test_value = Some(value);
    }
    if let Some(port) = non_empty(lookup(ENV_HTTP_PORT)) {
        config.http_port = match port.parse::<u16>() {
            Ok(p) => p,
            Err(_) => return Err(anyhow!(Errors::InvalidEnvValue(ENV_HTTP_PORT.to_string(), port))),
        };
    }
    Ok(config)
}

// ***************************************************************************
//                             Config Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_runtime_context:
// ---------------------------------------------------------------------------
pub fn init_runtime_context(args: &'static GreetingArgs, dirs: GreetingDirs) -> Result<RuntimeCtx> {
    let parms = get_parms(&dirs)?;
    Ok(RuntimeCtx { parms, args, dirs })
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn test_dirs() -> (tempfile::TempDir, GreetingDirs) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root").to_str().unwrap().to_string();
        let dirs = init_dirs(&root).unwrap();
        (tmp, dirs)
    }

    #[test]
    fn print_config() {
        let config = Config::new();
        println!("{:?}", config);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert!(!config.http_tls);
        assert_eq!(config.server_url(), "http://localhost:8080");
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            title = "Demo Server"
            app_name = "demo"
            test_value = "v1"
            http_port = 9000
        "#;
        let config = parse_config(toml, "greeting.toml").unwrap();
        assert_eq!(config.title, "Demo Server");
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.http_addr, None);
        assert_eq!(config.server_url(), "http://localhost:9000");
        assert_eq!(config.greeting_values(), GreetingValues {
            name: "demo".to_string(),
            test_value: Some("v1".to_string()),
        });
    }

    #[test]
    fn parse_rejects_malformed_toml() {
        assert!(parse_config("app_name = ", "greeting.toml").is_err());
        assert!(parse_config("http_port = \"eighty\"", "greeting.toml").is_err());
    }

    #[test]
    fn missing_values_policy() {
        let config = parse_config("app_name = \"\"\ntest_value = \"\"", "greeting.toml").unwrap();
        let values = config.greeting_values();
        assert_eq!(values.name, DEFAULT_APP_NAME);
        assert_eq!(values.test_value, None);
    }

    #[test]
    fn env_overrides_file_values() {
        let config = parse_config("app_name = \"file\"\ntest_value = \"t\"", "greeting.toml").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_APP_NAME, "demo"),
            (ENV_TEST_VALUE, "v1"),
            (ENV_HTTP_PORT, "3001"),
        ]);
        let config = apply_env_overrides(config, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.app_name.as_deref(), Some("demo"));
        assert_eq!(config.test_value.as_deref(), Some("v1"));
        assert_eq!(config.http_port, 3001);
    }

    #[test]
    fn empty_env_keeps_file_values() {
        let config = parse_config("app_name = \"demo\"\ntest_value = \"t\"", "greeting.toml").unwrap();
        let config = apply_env_overrides(config, |_| Some(String::new())).unwrap();
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.greeting_values(), GreetingValues {
            name: "demo".to_string(),
            test_value: Some("t".to_string()),
        });
    }

    #[test]
    fn server_url_scheme_follows_tls() {
        let mut config = Config::new();
        config.http_tls = true;
        assert_eq!(config.server_url(), "https://localhost:8080");

        config.http_addr = Some("http://greeter.example.org".to_string());
        assert_eq!(config.server_url(), "http://greeter.example.org:8080");
    }

    fn args(root_dir: Option<&str>) -> GreetingArgs {
        GreetingArgs { root_dir: root_dir.map(str::to_string), create_dirs_only: false }
    }

    #[test]
    fn root_dir_env_wins() {
        let root = resolve_root_dir(&args(Some("/from/args")), |k| {
            if k == ENV_ROOT_DIR { Some("/from/env".to_string()) } else { None }
        });
        assert_eq!(root, "/from/env");
    }

    #[test]
    fn root_dir_from_args() {
        assert_eq!(resolve_root_dir(&args(Some("/from/args")), no_env), "/from/args");
    }

    #[test]
    fn root_dir_default() {
        let root = resolve_root_dir(&args(None), no_env);
        assert!(Path::new(&root).is_absolute());
        assert!(root.ends_with("/.greeting_server"));
        if let Ok(home) = env::var("HOME") {
            assert_eq!(Path::new(&root), Path::new(&home).join(".greeting_server"));
        }
    }

    #[test]
    fn env_rejects_bad_port() {
        let result = apply_env_overrides(Config::new(), |k| {
            if k == ENV_HTTP_PORT { Some("not-a-port".to_string()) } else { None }
        });
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains(ENV_HTTP_PORT));
    }

    #[test]
    fn creates_data_dirs() {
        let (_tmp, dirs) = test_dirs();
        for d in [&dirs.root_dir, &dirs.config_dir, &dirs.logs_dir, &dirs.certs_dir] {
            let meta = fs::metadata(d).unwrap();
            assert!(meta.is_dir());
            assert_eq!(meta.permissions().mode() & 0o777, 0o700);
        }
        // A second pass accepts the existing directories.
        assert!(init_dirs(&dirs.root_dir).is_ok());
    }

    #[test]
    fn rejects_relative_root() {
        assert!(init_dirs("relative/root").is_err());
    }

    #[test]
    fn rejects_open_permissions() {
        let (_tmp, dirs) = test_dirs();
        fs::set_permissions(&dirs.logs_dir, fs::Permissions::from_mode(0o755)).unwrap();
        let msg = init_dirs(&dirs.root_dir).unwrap_err().to_string();
        assert!(msg.contains("logs directory"));
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let (_tmp, dirs) = test_dirs();
        let parms = load_parms(&dirs, no_env).unwrap();
        assert!(parms.config_file.ends_with("/config/greeting.toml"));
        assert_eq!(parms.config.app_name, None);
        assert_eq!(parms.config.http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn config_file_is_read() {
        let (_tmp, dirs) = test_dirs();
        fs::write(dirs.config_dir.clone() + GREETING_CONFIG_FILE,
                  "app_name = \"demo\"\ntest_value = \"v1\"\n").unwrap();
        let parms = load_parms(&dirs, no_env).unwrap();
        assert_eq!(parms.config.greeting_values().name, "demo");
        assert_eq!(parms.config.greeting_values().test_value.as_deref(), Some("v1"));
    }

    #[test]
    fn malformed_log_config_is_an_error() {
        let (_tmp, dirs) = test_dirs();
        fs::write(dirs.config_dir.clone() + LOG4RS_CONFIG_FILE, "appenders: [").unwrap();
        let msg = init_log(&dirs).unwrap_err().to_string();
        assert!(msg.contains("log4rs.yml"));
    }

    #[test]
    fn bad_config_file_is_an_error() {
        let (_tmp, dirs) = test_dirs();
        fs::write(dirs.config_dir.clone() + GREETING_CONFIG_FILE, "[[[").unwrap();
        assert!(load_parms(&dirs, no_env).is_err());
    }
}
