use clap::{Parser, ValueEnum};
use mock_server::{MockServer, Scripted};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    Ok,
    RateLimited,
    ServerError,
}

#[derive(Debug, Parser)]
#[command(version, about = "Standalone mock LLM upstream for manual testing against tokenman")]
struct Args {
    #[arg(short, long, default_value_t = 9988)]
    port: u16,

    #[arg(short, long, value_enum, default_value_t = Scenario::Ok)]
    scenario: Scenario,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let script = match args.scenario {
        Scenario::Ok => vec![Scripted::anthropic_ok("hello from the mock upstream")],
        Scenario::RateLimited => vec![Scripted::rate_limited(1), Scripted::anthropic_ok("recovered")],
        Scenario::ServerError => vec![Scripted::server_error()],
    };

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port))
        .await
        .expect("failed to bind mock server port");
    tracing::info!(port = args.port, ?args.scenario, "mock upstream listening");
    axum::serve(listener, MockServer::new(script).into_router())
        .await
        .expect("mock server crashed");
}
