// Trace method entries of one class
//
// Usage: trace_entries <host:port> <jni-signature> [count]
//
// Hooks every method entry of the class, prints each hit with the thread
// name, and resumes the thread so the program keeps running.

use anyhow::{bail, Context, Result};
use jdwp_session::{Event, Session};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jdwp_session=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: trace_entries <host:port> <jni-signature> [count]");
    }
    let (host, port) = args[0]
        .rsplit_once(':')
        .context("target must be host:port")?;
    let limit: usize = args.get(2).map(|n| n.parse()).transpose()?.unwrap_or(20);

    let session = Session::connect(host, port.parse()?).await?;
    let classes = session.classes(Some(args[1].as_str())).await?;
    let Some(class) = classes.first() else {
        bail!("class {} is not loaded", args[1]);
    };

    let hook = class.hook_entries(None).await?;
    info!("Hooked {} (request id {})", class.name().await?, hook.request_id());

    let mut seen = 0;
    while seen < limit {
        let Some(event) = hook.next_event(Some(Duration::from_secs(30))).await else {
            warn!("No entries for 30s, giving up");
            break;
        };
        let Event::MethodEntry { thread, location, .. } = event else {
            continue;
        };

        let method = location.method()?;
        println!(
            "[{}] {}",
            thread.name().await.unwrap_or_else(|_| "?".into()),
            method.describe().await?
        );
        seen += 1;
        thread.resume().await?;
    }

    hook.clear().await?;
    Ok(())
}
