use super::*;
use serde::Deserialize;

/// The server configuration: logging, the node core, and optional BIBE
/// tunnelling.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// The log level, overridable by the `TERN_NODE_LOG_LEVEL`
    /// environment variable.
    pub log_level: Option<String>,

    /// Node core configuration.
    #[serde(default)]
    pub bpa: tern_bpa::config::Config,

    /// BIBE tunnel configuration; absent disables BIBE.
    pub bibe: Option<BibeSettings>,

    /// AAP socket server configuration; absent disables the server.
    pub aap: Option<AapSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AapSettings {
    /// The address the AAP server listens on.
    pub listen: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BibeSettings {
    /// The EID outer bundles are sourced from; defaults to the node EID.
    pub tunnel_source: Option<String>,
}

/// Parses the command line and loads the configuration file.
///
/// Returns `None` if `--help` or `--version` was handled.
pub fn init() -> anyhow::Result<Option<(Settings, String)>> {
    let mut opts = getopts::Options::new();
    opts.optflag("h", "help", "print this help menu")
        .optflag("v", "version", "print the version")
        .optopt("c", "config", "use a custom configuration file", "FILE");

    let args: Vec<String> = std::env::args().collect();
    let flags = opts.parse(&args[1..])?;
    if flags.opt_present("h") {
        let brief = format!("Usage: {} [options]", super::PKG_NAME);
        print!("{}", opts.usage(&brief));
        return Ok(None);
    }
    if flags.opt_present("v") {
        println!("{} version {}", super::PKG_NAME, super::PKG_VERSION);
        return Ok(None);
    }

    let mut builder = ::config::Config::builder();
    let source = match flags.opt_str("c") {
        Some(path) => {
            builder = builder.add_source(::config::File::with_name(&path));
            format!("Using configuration file {path}")
        }
        None => {
            builder = builder.add_source(
                ::config::File::with_name("tern-node.config").required(false),
            );
            "Using default configuration".to_string()
        }
    };
    builder = builder.add_source(::config::Environment::with_prefix("TERN_NODE"));

    let settings = builder.build()?.try_deserialize()?;
    Ok(Some((settings, source)))
}
