use std::fs;
use std::path::PathBuf;

use chanlun::{ChanConfig, ChanEngine, Timeframe, init_logging};
use replay::build_export_payload;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "usage: cargo run -p replay --bin export_chan_structures -- <csv_path> <symbol> <timeframe:1m|5m|15m|30m|60m|1d> [output_json] [config_yaml]"
        );
        std::process::exit(2);
    }
    let csv_path = PathBuf::from(&args[1]);
    let symbol = args[2].clone();
    let timeframe = Timeframe::parse(&args[3])?;
    let output_json = args.get(4).map(PathBuf::from);
    let config = match args.get(5) {
        Some(path) => ChanConfig::from_yaml_file(path)?,
        None => ChanConfig::default(),
    };

    let mut engine = ChanEngine::new(symbol.clone(), config);
    engine.register(timeframe);
    let count = engine.load_csv(timeframe, &csv_path)?;
    engine.finalize_all()?;
    eprintln!("loaded {count} bars from {}", csv_path.display());

    let Some(list) = engine.kline_list(timeframe) else {
        eprintln!("timeframe {} skipped, nothing to export", timeframe.as_str());
        return Ok(());
    };
    let payload = build_export_payload(list, symbol, timeframe.as_str());
    let json = serde_json::to_string_pretty(&payload)?;

    match output_json {
        Some(path) => {
            fs::write(&path, json)?;
            eprintln!(
                "exported {} merged candles / {} bis / {} segs to {}",
                payload.merged_candles.len(),
                payload.bi_segments_sure.len() + payload.bi_segments_virtual.len(),
                payload.seg_segments_sure.len() + payload.seg_segments_left.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }

    Ok(())
}
