// Dump the stack of a thread with its local variables
//
// Usage: dump_frames <host:port> <thread-name>
//
// Suspends the named thread, prints every frame and the values of its live
// locals, then resumes it.

use anyhow::{bail, Context, Result};
use jdwp_session::{Session, Value};

async fn render(value: &Value) -> String {
    match value {
        Value::String(s) => match s.data().await {
            Ok(text) => format!("{text:?}"),
            Err(_) => value.to_string(),
        },
        other => other.to_string(),
    }
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

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 {
        bail!("usage: dump_frames <host:port> <thread-name>");
    }
    let (host, port) = args[0]
        .rsplit_once(':')
        .context("target must be host:port")?;

    let session = Session::connect(host, port.parse()?).await?;
    let threads = session.threads(Some(args[1].as_str())).await?;
    let Some(thread) = threads.first() else {
        bail!("no thread named {}", args[1]);
    };

    thread.suspend().await?;
    let (status, suspend) = thread.status().await?;
    println!("{} ({}, {})", thread.name().await?, status.name(), suspend.name());

    for frame in thread.frames().await? {
        let Some(location) = frame.location() else {
            continue;
        };
        let method = location.method()?;
        let line = location
            .source_line()
            .await?
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".into());
        println!("  at {} line {}", method.describe().await?, line);

        for (name, value) in frame.values().await? {
            println!("      {} = {}", name, render(&value).await);
        }
    }

    thread.resume().await?;
    Ok(())
}
