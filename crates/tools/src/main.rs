use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use formats::GeoDocument;
use layers::{MapPage, PageStrategy, UploadedFile};
use serde::Serialize;
use tiling::{TileAddress, TileIndex, TileIndexOptions, synthesize_tile};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let mut args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let cmd = args[1].clone();
    args.drain(0..2);

    match cmd.as_str() {
        "inspect" => cmd_inspect(args),
        "normalize" => cmd_normalize(args),
        "tile" => cmd_tile(args),
        "tiles" => cmd_tiles(args),
        "upload" => cmd_upload(args),
        _ => Err(usage()),
    }
}

#[derive(Serialize)]
struct DocumentSummary {
    features: usize,
    points: usize,
    null_geometries: usize,
    geometry_kinds: BTreeMap<&'static str, usize>,
    /// [min_lon, min_lat, max_lon, max_lat]
    extent: Option<[f64; 4]>,
    content_hash: Option<String>,
}

fn cmd_inspect(args: Vec<String>) -> Result<(), String> {
    // geotile inspect <input.geojson>
    if args.len() != 1 {
        return Err(usage());
    }
    let doc = read_document(&PathBuf::from(&args[0]))?;

    let mut geometry_kinds = BTreeMap::new();
    let mut null_geometries = 0;
    for feature in &doc.features {
        match &feature.geometry {
            Some(g) => *geometry_kinds.entry(g.kind().as_str()).or_insert(0) += 1,
            None => null_geometries += 1,
        }
    }

    let summary = DocumentSummary {
        features: doc.features.len(),
        points: doc.point_count(),
        null_geometries,
        geometry_kinds,
        extent: doc
            .extent()
            .map(|b| [b.min[0], b.min[1], b.max[0], b.max[1]]),
        content_hash: doc.content_hash.clone(),
    };
    let payload = serde_json::to_string_pretty(&summary).map_err(|e| format!("json: {e}"))?;
    println!("{payload}");
    Ok(())
}

fn cmd_normalize(args: Vec<String>) -> Result<(), String> {
    // geotile normalize <input.geojson>
    if args.len() != 1 {
        return Err(usage());
    }
    let doc = read_document(&PathBuf::from(&args[0]))?;
    let payload = doc.to_geojson_string().map_err(|e| format!("json: {e}"))?;
    println!("{payload}");
    Ok(())
}

fn cmd_tile(args: Vec<String>) -> Result<(), String> {
    // geotile tile <input.geojson> <z> <x> <y> [index flags] [--pretty]
    if args.len() < 4 {
        return Err(usage());
    }
    let input = PathBuf::from(&args[0]);
    let z = parse_num::<u8>(&args[1], "z")?;
    let x = parse_num::<u32>(&args[2], "x")?;
    let y = parse_num::<u32>(&args[3], "y")?;

    let mut pretty = false;
    let options = parse_index_flags(&args[4..], |flag| {
        if flag == "--pretty" {
            pretty = true;
            true
        } else {
            false
        }
    })?;

    let doc = read_document(&input)?;
    let index = TileIndex::build(&doc, options);
    let tile = synthesize_tile(&index, TileAddress::new(z, x, y));

    let payload = if pretty {
        tile.to_geojson_string_pretty()
    } else {
        tile.to_geojson_string()
    }
    .map_err(|e| format!("json: {e}"))?;
    println!("{payload}");
    Ok(())
}

fn cmd_tiles(args: Vec<String>) -> Result<(), String> {
    // geotile tiles <input.geojson> <z> [index flags]
    if args.len() < 2 {
        return Err(usage());
    }
    let input = PathBuf::from(&args[0]);
    let z = parse_num::<u8>(&args[1], "z")?;
    let options = parse_index_flags(&args[2..], |_| false)?;

    let doc = read_document(&input)?;
    let index = TileIndex::build(&doc, options);
    if z > index.options().max_zoom {
        return Err(format!(
            "zoom {z} is deeper than max zoom {}",
            index.options().max_zoom
        ));
    }

    for (address, count) in index.occupied_tiles(z) {
        println!("{}\t{count}", address.cache_key());
    }
    Ok(())
}

fn cmd_upload(args: Vec<String>) -> Result<(), String> {
    // geotile upload --page <webgl|webgl-multi|canvas|image|vector-tile> <file> [file ...]
    let mut strategy = PageStrategy::image();
    let mut paths: Vec<PathBuf> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--page" => {
                i += 1;
                let kind = args.get(i).ok_or("--page requires a value".to_string())?;
                strategy = parse_page(kind)?;
            }
            s if s.starts_with('-') => {
                return Err(format!("unknown arg: {s}\n\n{}", usage()));
            }
            _ => paths.push(PathBuf::from(&args[i])),
        }
        i += 1;
    }
    if paths.is_empty() {
        return Err("upload requires at least one file".to_string());
    }

    let mut files = Vec::with_capacity(paths.len());
    for p in &paths {
        let contents = fs::read_to_string(p).map_err(|e| format!("read {p:?}: {e}"))?;
        let name = p
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| format!("invalid filename: {p:?}"))?;
        files.push(UploadedFile::new(name, contents));
    }

    let mut page = MapPage::new(strategy);
    let outcome = page.upload(&files);
    for err in &outcome.errors {
        eprintln!("{err}");
    }
    for entry in page.layers() {
        let visible = if entry.visible { "visible" } else { "hidden" };
        println!("{}\t{}\t{visible}", entry.id, entry.name);
    }
    if let Some(fit) = outcome.fit {
        eprintln!(
            "fit extent [{}, {}, {}, {}]",
            fit.extent.min[0], fit.extent.min[1], fit.extent.max[0], fit.extent.max[1]
        );
    }
    Ok(())
}

fn parse_page(kind: &str) -> Result<PageStrategy, String> {
    match kind {
        "webgl" => Ok(PageStrategy::webgl()),
        "webgl-multi" => Ok(PageStrategy::webgl_multi()),
        "canvas" => Ok(PageStrategy::canvas()),
        "image" => Ok(PageStrategy::image()),
        "vector-tile" => Ok(PageStrategy::vector_tile()),
        other => Err(format!("unknown page kind: {other}")),
    }
}

/// Parse `--config FILE`, `--extent N`, `--buffer N`, `--max-zoom N` and
/// `--debug N`; `extra` gets a chance at every other flag.
fn parse_index_flags(
    args: &[String],
    mut extra: impl FnMut(&str) -> bool,
) -> Result<TileIndexOptions, String> {
    let mut options = TileIndexOptions::default();

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--config" | "--extent" | "--buffer" | "--max-zoom" | "--debug" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("{flag} requires a value"))?;
                match flag {
                    "--config" => {
                        let text = fs::read_to_string(value)
                            .map_err(|e| format!("read {value:?}: {e}"))?;
                        options = TileIndexOptions::from_json_str(&text)
                            .map_err(|e| format!("config {value:?}: {e}"))?;
                    }
                    "--extent" => options.extent = parse_num(value, flag)?,
                    "--buffer" => options.buffer = parse_num(value, flag)?,
                    "--max-zoom" => options.max_zoom = parse_num(value, flag)?,
                    _ => options.debug = parse_num(value, flag)?,
                }
            }
            s if extra(s) => {}
            s if s.starts_with('-') => {
                return Err(format!("unknown arg: {s}\n\n{}", usage()));
            }
            s => {
                return Err(format!("unexpected arg: {s}\n\n{}", usage()));
            }
        }
        i += 1;
    }
    Ok(options)
}

fn parse_num<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("{what} must be a non-negative integer, got {value:?}"))
}

fn read_document(path: &Path) -> Result<GeoDocument, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
    GeoDocument::from_geojson_str(&text).map_err(|e| format!("decode geojson {path:?}: {e}"))
}

fn usage() -> String {
    let exe = env::args().next().unwrap_or_else(|| "geotile".to_string());
    format!(
        "Usage:\n  {exe} inspect <input.geojson>\n  {exe} normalize <input.geojson>\n  {exe} tile <input.geojson> <z> <x> <y> [--config FILE] [--extent N] [--buffer N] [--max-zoom N] [--debug N] [--pretty]\n  {exe} tiles <input.geojson> <z> [--config FILE] [--extent N] [--buffer N] [--max-zoom N]\n  {exe} upload [--page webgl|webgl-multi|canvas|image|vector-tile] <file> [file ...]\n\nNotes:\n- Tile coordinates are tile pixels (0..extent); tiles print as a GeoJSON FeatureCollection.\n- `normalize` prints the upload as a plain FeatureCollection.\n- `tiles` lists `[z,x,y]` keys with their feature counts.\n- Set RUST_LOG=debug to see index and tile logs.\n"
    )
}
