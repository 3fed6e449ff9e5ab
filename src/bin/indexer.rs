//! Rebuild CLI: recreates the sink schema and replays the full send-event
//! history from offset 0 against the configured remote node.

use bridge_relayer::config::IndexerConfig;
use bridge_relayer::indexer::sink::{FinalizedVisitor, MinedVisitor};
use bridge_relayer::indexer::{
    visit_all, EventSink, HttpEventQuery, EVENT_SEND_FINALIZED, EVENT_SEND_MINED,
};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    let config = IndexerConfig::load()?;
    tracing::info!(
        node_url = %config.node_url,
        sink_path = %config.sink_path,
        "Starting index rebuild"
    );

    let sink = EventSink::connect(&config.sink_path).await?;
    sink.rebuild_schema().await?;
    tracing::info!("Sink schema rebuilt");

    let query = HttpEventQuery::new(&config.node_url);

    let finalized = replay(
        &query,
        EVENT_SEND_FINALIZED,
        &mut FinalizedVisitor { sink: &sink },
    )
    .await?;
    let mined = replay(&query, EVENT_SEND_MINED, &mut MinedVisitor { sink: &sink }).await?;

    tracing::info!(finalized, mined, "Index rebuild complete");
    Ok(())
}

async fn replay<V: bridge_relayer::indexer::EventVisitor>(
    query: &HttpEventQuery,
    subtype: &str,
    visitor: &mut V,
) -> eyre::Result<u64> {
    match visit_all(query, subtype, 0, visitor).await {
        Ok(processed) => {
            tracing::info!(subtype, processed, "Replay finished");
            Ok(processed)
        }
        Err(e) => {
            tracing::error!(
                subtype,
                processed = e.processed(),
                error = %e,
                "Replay aborted with partial progress"
            );
            Err(e.into())
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_relayer=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}
