//! Two gateways on one in-memory stream, exchanging work in both
//! directions. Run with `RUST_LOG=wiregate=debug` to watch the frames.

use std::time::Duration;

use wiregate::{
    ExecError, Gateway, GatewayRegistry, HandlerExecutor, Value,
};

/// The vocabulary the "server" end understands.
fn server_handlers() -> HandlerExecutor {
    HandlerExecutor::new()
        .register("echo", |channel| async move {
            // One request, one reply, done.
            let value = channel.receive().await.map_err(ExecError::from)?;
            channel.send(value).map_err(ExecError::from)?;
            Ok(())
        })
        .register("sum", |channel| async move {
            // Keep adding ints until the client sends Null.
            let mut total = 0i64;
            loop {
                match channel.receive().await.map_err(ExecError::from)? {
                    Value::Int(n) => total += n,
                    Value::Null => break,
                    other => {
                        return Err(ExecError::new(format!(
                            "sum expects ints, got {other:?}"
                        )))
                    }
                }
            }
            channel.send(Value::Int(total)).map_err(ExecError::from)?;
            Ok(())
        })
}

#[tokio::main]
async fn main() -> Result<(), wiregate::GatewayError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let registry = GatewayRegistry::new();

    let (near, far) = wiregate::pair();
    let server = Gateway::builder()
        .start_id(1)
        .executor(server_handlers())
        .spawn(far);
    let client = Gateway::spawn(near);
    registry.register(server);
    registry.register(client.clone());

    // Echo a value.
    let channel = client.remote_exec("echo")?;
    channel.send(Value::Str("hello across the wire".into()))?;
    let reply = channel.receive().await?;
    tracing::info!(?reply, "echo came back");
    channel.wait_close(Duration::from_secs(1)).await?;

    // Stream ints at the peer, get one total back.
    let channel = client.remote_exec("sum")?;
    for n in 1..=10 {
        channel.send(Value::Int(n))?;
    }
    channel.send(Value::Null)?;
    let total = channel.receive().await?;
    tracing::info!(?total, "sum came back");
    channel.wait_close(Duration::from_secs(1)).await?;

    registry.shutdown_all().await;
    tracing::info!("all gateways wound down");
    Ok(())
}
