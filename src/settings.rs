use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use config::Config;
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::{
    alertmanager_webhook_receiver::AlertReceiverSettings, cachet::CachetSettings, log::LogSettings,
    reconciler::ReconcilerSettings, telemetry_endpoint::TelemetryEndpointSettings,
};

static SETTINGS: OnceCell<Settings> = OnceCell::new();

const URL_VAR: &str = "CACHET_URL";
const KEY_VAR: &str = "CACHET_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub listen: AlertReceiverSettings,
    pub log: LogSettings,
    pub cachet: CachetSettings,
    #[serde(default)]
    pub reconciler: ReconcilerSettings,
    pub telemetry_endpoint: TelemetryEndpointSettings,
}

impl Settings {
    /// settings of the process, loaded from config file, environment and
    /// command line on first access
    pub fn global() -> Result<&'static Self> {
        SETTINGS
            .get_or_try_init(Self::load)
            .context("failed to load config and command line arguments")
    }

    fn command() -> Command {
        Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .author(clap::crate_authors!())
            .args([
                Arg::new("config")
                    .help("path of config file, ignored if it doesn't exist")
                    .short('c')
                    .long("config")
                    .default_value("./config.yaml"),
                Arg::new("address")
                    .help("the address to listen on for HTTP requests [default: 0.0.0.0]")
                    .long("address"),
                Arg::new("port")
                    .help("the port number to listen on for HTTP requests [default: 8080]")
                    .long("port")
                    .value_parser(value_parser!(u16)),
                Arg::new("level")
                    .help("log level: error, warn, info or debug [default: info]")
                    .long("level")
                    .alias("log"),
                Arg::new("legacy-status")
                    .help("answer malformed webhooks with 200 instead of 400")
                    .long("legacy-status")
                    .action(ArgAction::SetTrue),
            ])
    }

    fn load() -> Result<Self> {
        Self::from_matches(&Self::command().get_matches(), |var| std::env::var(var).ok())
    }

    /// Layers defaults, the config file, `CACHET_URL`/`CACHET_KEY` and the
    /// command line, later layers win.
    fn from_matches(opts: &ArgMatches, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config_path = opts
            .get_one::<String>("config")
            .map_or("./config.yaml", String::as_str);

        let env = |var: &str| env(var).filter(|value: &String| !value.is_empty());

        let conf = Config::builder()
            .set_default("listen.bind_address", "0.0.0.0")?
            .set_default("listen.port", 8080_i64)?
            .set_default("listen.legacy_status", false)?
            .set_default("log.level", "info")?
            .set_default("cachet.timeout", 10_i64)?
            .set_default("telemetry_endpoint.enabled", false)?
            .set_default("telemetry_endpoint.bind_address", "127.0.0.1")?
            .set_default("telemetry_endpoint.port", 9090_i64)?
            .add_source(config::File::with_name(config_path).required(false))
            .set_override_option("cachet.url", env(URL_VAR))?
            .set_override_option("cachet.key", env(KEY_VAR))?
            .set_override_option("listen.bind_address", opts.get_one::<String>("address").cloned())?
            .set_override_option("listen.port", opts.get_one::<u16>("port").map(|port| i64::from(*port)))?
            .set_override_option("listen.legacy_status", opts.get_flag("legacy-status").then_some(true))?
            .set_override_option("log.level", opts.get_one::<String>("level").cloned())?
            .build()
            .context("can't load config")?;

        if conf.get_string("cachet.url").is_err() {
            bail!("Cachet URL not provided, please set environment variable '{URL_VAR}'");
        }
        if conf.get_string("cachet.key").is_err() {
            bail!("Cachet API token not provided, please set environment variable '{KEY_VAR}'");
        }

        conf.try_deserialize().context("can't load config")
    }
}
