use std::io::{self, BufReader, BufWriter, Write};

use anyhow::Context;
use tracing::{error, info};

use label_consensus::{
    config::Config, observability::Telemetry, pipeline::engine_from_config, schema::RawLabel,
};

fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    let telemetry = Telemetry::new().context("failed to initialise telemetry")?;
    let config = Config::from_env().context("failed to load configuration")?;
    let engine = engine_from_config(&config, Some(telemetry.metrics()))
        .context("failed to resolve run plan")?;

    let rows: Vec<RawLabel> = serde_json::from_reader(BufReader::new(io::stdin().lock()))
        .context("failed to parse label rows from stdin")?;
    info!(rows = rows.len(), mode = %config.mode(), "label rows loaded");

    let result = engine.run(rows).context("label clustering failed")?;

    let mut out = BufWriter::new(io::stdout().lock());
    serde_json::to_writer(&mut out, &result).context("failed to write result")?;
    out.write_all(b"\n").context("failed to write result")?;
    out.flush().context("failed to flush result")?;

    tracing::debug!(metrics = %telemetry.render_prometheus(), "run metrics");
    Ok(())
}
