//! Command-line front end for the Maya bridge.
//!
//! Run with: cargo run -p bridge-cli -- send scripts/build_rig.py
//!
//! Maya must have its command ports open, e.g. in the script editor:
//! `commandPort -name ":7001" -sourceType "mel"; commandPort -name ":7002" -sourceType "python";`

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use maya_bridge_core::{
    BridgeSettings, ConfigError, JsonSettingsFile, SettingsSource, StaticSettings,
};
use maya_bridge_session::{Bridge, Dispatch, Document};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "maya-bridge", about = "Send Python and MEL code to a running Maya")]
struct Args {
    /// Settings file (defaults to the per-user MayaBridge.json)
    #[arg(long, env = "MAYA_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Maya host, overriding the settings file
    #[arg(long, env = "MAYA_BRIDGE_HOST")]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a snippet or a whole saved file
    Send {
        /// File to run
        file: Option<PathBuf>,

        /// Code to run instead of a file
        #[arg(short, long, conflicts_with = "file")]
        code: Option<String>,

        /// Language of --code
        #[arg(long, value_enum, default_value = "python")]
        lang: Lang,

        /// Print Maya's output for this many seconds after sending
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Print Maya's script editor output until interrupted
    Listen,
}

#[derive(Clone, Copy, ValueEnum)]
enum Lang {
    Python,
    Mel,
}

impl Lang {
    const fn syntax(self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::Mel => "MEL",
        }
    }
}

/// Settings file with an optional host override on top.
struct CliSettings {
    file: JsonSettingsFile,
    host: Option<String>,
}

impl SettingsSource for CliSettings {
    fn load(&self) -> Result<BridgeSettings, ConfigError> {
        let mut settings = self.file.load()?;
        if let Some(host) = &self.host {
            settings.maya_hostname = Some(host.clone());
        }
        Ok(settings)
    }
}

fn settings_source(args: &Args) -> Arc<dyn SettingsSource> {
    let file = args
        .config
        .clone()
        .map(JsonSettingsFile::new)
        .or_else(JsonSettingsFile::user_default);
    match file {
        Some(file) => Arc::new(CliSettings {
            file,
            host: args.host.clone(),
        }),
        None => Arc::new(StaticSettings(BridgeSettings {
            maya_hostname: args.host.clone(),
            ..BridgeSettings::default()
        })),
    }
}

fn document_for_file(path: PathBuf) -> anyhow::Result<Document> {
    let syntax = match path.extension().and_then(|ext| ext.to_str()) {
        Some("py") => "Python",
        Some("mel") => "MEL",
        _ => bail!("Cannot tell the language of {}", path.display()),
    };
    let path = path
        .canonicalize()
        .with_context(|| format!("Cannot read {}", path.display()))?;
    Ok(Document {
        syntax: syntax.to_string(),
        file_path: Some(path),
        ..Document::default()
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut bridge = Bridge::with_defaults(settings_source(&args));

    match args.command {
        Command::Send {
            file,
            code,
            lang,
            watch,
        } => {
            let document = match (code, file) {
                (Some(code), _) => Document {
                    syntax: lang.syntax().to_string(),
                    selections: vec![code],
                    ..Document::default()
                },
                (None, Some(file)) => document_for_file(file)?,
                (None, None) => bail!("Nothing to send: pass a file or --code"),
            };

            if watch.is_some() {
                bridge.enable_output().await?;
            }
            match bridge.send_document(&document).await? {
                Dispatch::Sent(outcome) => tracing::debug!(?outcome, "Send finished"),
                Dispatch::NothingToSend => tracing::warn!("Nothing to send"),
                Dispatch::UnsupportedLanguage => bail!("Unsupported language"),
            }
            if let Some(secs) = watch {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                bridge.disable_output().await?;
            }
        }
        Command::Listen => {
            bridge.enable_output().await?;
            tracing::info!("Streaming Maya output, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            bridge.disable_output().await?;
        }
    }

    bridge.unload();
    Ok(())
}
