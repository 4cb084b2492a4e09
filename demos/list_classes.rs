// List loaded classes of a debuggable VM
//
// Usage: list_classes <host:port | unix-socket-path> [jni-signature]
//
// Prints the VM version and capabilities, then every loaded class (or only
// those matching the signature) with its methods.

use anyhow::{bail, Context, Result};
use jdwp_session::{Session, SessionConfig};
use tracing::info;

async fn open(target: &str) -> Result<Session> {
    let config = SessionConfig::default();
    let session = match target.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => {
            Session::connect_with_config(host, port.parse()?, config).await?
        }
        _ if target.parse::<u16>().is_ok() => {
            Session::connect_with_config("127.0.0.1", target.parse()?, config).await?
        }
        _ => Session::connect_unix(target, config).await?,
    };
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jdwp_session=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(target) = args.next() else {
        bail!("usage: list_classes <host:port | socket-path> [jni-signature]");
    };
    let filter = args.next();

    let session = open(&target)
        .await
        .with_context(|| format!("connecting to {target}"))?;

    let version = session.version().await?;
    info!("Connected to {} ({})", version.vm_name, version.vm_version);
    println!("{}", serde_json::to_string_pretty(&session.capabilities().await?)?);

    for class in session.classes(filter.as_deref()).await? {
        println!("{}", class.name().await?);
        for method in class.methods(None, None).await? {
            let modifiers = method.modifiers().await?;
            println!(
                "    {} {}{}",
                modifiers.method_keywords(),
                method.name().await?,
                method.signature().await?
            );
        }
    }

    Ok(())
}
