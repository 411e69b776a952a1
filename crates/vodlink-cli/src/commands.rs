//! CLI command implementations

use crate::output::{self, OutputFormat};
use crate::HostArgs;
use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vodlink_core::engine::MediaInfo;
use vodlink_core::{
    CountingSurfaceProvider, DirAssetBundle, Dispatcher, Event, MethodCall, RegistryConfig, Reply,
    SessionId, SessionRegistry, SimulatedEngineFactory,
};

/// Method name the script runner handles itself instead of dispatching
const WAIT_METHOD: &str = "wait";

/// Build a registry backed by the simulated engine
pub fn build_host(args: &HostArgs) -> Dispatcher {
    let mut config = RegistryConfig::default();
    if let Some(dir) = &args.cache_dir {
        config.asset_cache_dir = dir.clone();
    }
    if let Some(capacity) = args.buffer_capacity {
        config.event_buffer_capacity = capacity;
    }

    let engines = SimulatedEngineFactory::new(MediaInfo {
        duration_ms: args.media_duration,
        width: 1280,
        height: 720,
    });
    let registry = SessionRegistry::new(
        config,
        Arc::new(engines),
        Arc::new(CountingSurfaceProvider::new()),
        Arc::new(DirAssetBundle::new(&args.asset_root)),
    );
    Dispatcher::new(Arc::new(registry))
}

/// One line of a script
#[derive(Debug, PartialEq)]
enum ScriptLine {
    Call(MethodCall),
    Wait(Duration),
    Skip,
}

fn parse_line(line: &str) -> anyhow::Result<ScriptLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(ScriptLine::Skip);
    }

    let call: MethodCall = serde_json::from_str(line).context("malformed method call")?;
    if call.method == WAIT_METHOD {
        let ms = call
            .arguments
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("wait needs an integer ms argument"))?;
        return Ok(ScriptLine::Wait(Duration::from_millis(ms)));
    }
    Ok(ScriptLine::Call(call))
}

/// Dispatch off the async runtime; teardown may join engine threads
async fn dispatch(
    dispatcher: &Dispatcher,
    call: MethodCall,
) -> anyhow::Result<(MethodCall, Reply)> {
    let dispatcher = dispatcher.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let reply = dispatcher.handle(&call);
        (call, reply)
    })
    .await?;
    Ok(outcome)
}

/// Attach a printing consumer to a session
fn watch(
    dispatcher: &Dispatcher,
    id: SessionId,
    format: OutputFormat,
) -> anyhow::Result<JoinHandle<()>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher.registry().attach(id, Box::new(tx))?;
    Ok(tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", output::format_event(id, &event, format));
        }
    }))
}

fn created_session(reply: &Reply) -> Option<SessionId> {
    match reply {
        Reply::Success { result } => result.get("sessionId").and_then(Value::as_i64).map(SessionId),
        _ => None,
    }
}

/// Execute a script of method calls
pub async fn run(host: &HostArgs, script: Option<PathBuf>, format: &str) -> anyhow::Result<()> {
    let format = OutputFormat::from(format);
    let dispatcher = build_host(host);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open script {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut lines = reader.lines();
    let mut watchers = Vec::new();
    let mut failures = 0usize;

    while let Some(line) = lines.next_line().await? {
        let call = match parse_line(&line) {
            Ok(ScriptLine::Call(call)) => call,
            Ok(ScriptLine::Wait(delay)) => {
                tokio::time::sleep(delay).await;
                continue;
            }
            Ok(ScriptLine::Skip) => continue,
            Err(e) => {
                warn!(error = %e, line = %line, "Skipping line");
                failures += 1;
                continue;
            }
        };

        let (call, reply) = dispatch(&dispatcher, call).await?;
        println!("{}", output::format_reply(&call.method, &reply, format));

        if !reply.is_success() {
            failures += 1;
        } else if call.method == "create" {
            if let Some(id) = created_session(&reply) {
                watchers.push(watch(&dispatcher, id, format)?);
            }
        }
    }

    let registry = Arc::clone(dispatcher.registry());
    let disposed = tokio::task::spawn_blocking(move || registry.dispose_all()).await?;
    for watcher in watchers {
        let _ = watcher.await;
    }

    info!(disposed, failures, "Script finished");
    Ok(())
}

/// Play one source to the end
pub async fn play(
    host: &HostArgs,
    source: &str,
    asset: bool,
    interval: u64,
    timeout: u64,
    format: &str,
) -> anyhow::Result<()> {
    let format = OutputFormat::from(format);
    let dispatcher = build_host(host);

    let mut args = json!({
        "progressInterval": interval,
        "loop": false,
        "autoPlay": true,
    });
    args[if asset { "asset" } else { "uri" }] = json!(source);

    let (_, reply) = dispatch(&dispatcher, MethodCall::new("create", args)).await?;
    println!("{}", output::format_reply("create", &reply, format));
    let Some(id) = created_session(&reply) else {
        bail!("could not create a session for {source}");
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher.registry().attach(id, Box::new(tx))?;

    let outcome = tokio::time::timeout(Duration::from_secs(timeout), async {
        while let Some(event) = rx.recv().await {
            println!("{}", output::format_event(id, &event, format));
            match event {
                Event::PlayEnd => return Ok(()),
                Event::Error { error_info } => return Err(anyhow!("playback failed: {error_info}")),
                _ => {}
            }
        }
        Ok(())
    })
    .await;

    let dispose = MethodCall::new("dispose", json!({ "sessionId": id }));
    let (_, reply) = dispatch(&dispatcher, dispose).await?;
    println!("{}", output::format_reply("dispose", &reply, format));

    match outcome {
        Ok(result) => result,
        Err(_) => bail!("playback did not finish within {timeout}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("").unwrap(), ScriptLine::Skip);
        assert_eq!(parse_line("# comment").unwrap(), ScriptLine::Skip);
        assert_eq!(
            parse_line(r#"{"method": "wait", "arguments": {"ms": 250}}"#).unwrap(),
            ScriptLine::Wait(Duration::from_millis(250))
        );
        assert_eq!(
            parse_line(r#"{"method": "play", "arguments": {"textureId": 0}}"#).unwrap(),
            ScriptLine::Call(MethodCall::new("play", json!({"textureId": 0})))
        );
        assert_eq!(
            parse_line(r#"{"method": "init"}"#).unwrap(),
            ScriptLine::Call(MethodCall::new("init", Value::Null))
        );
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"method": "wait"}"#).is_err());
    }

    #[tokio::test]
    async fn test_script_session_round() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostArgs {
            cache_dir: Some(dir.path().join("cache")),
            asset_root: dir.path().to_path_buf(),
            buffer_capacity: None,
            media_duration: 200,
        };
        let dispatcher = build_host(&host);

        let create = MethodCall::new(
            "create",
            json!({
                "uri": "file:///a.mp4",
                "progressInterval": 50,
                "loop": false,
                "autoPlay": true
            }),
        );
        let (_, reply) = dispatch(&dispatcher, create).await.unwrap();
        let id = created_session(&reply).unwrap();

        let dispose = MethodCall::new("dispose", json!({"sessionId": id.0}));
        let (_, reply) = dispatch(&dispatcher, dispose).await.unwrap();
        assert!(reply.is_success());
        assert!(dispatcher.registry().is_empty());
    }
}
