use clap::Parser;
use liveagent_api::router::ApiDoc;
use std::path::PathBuf;
use utoipa::OpenApi;

#[derive(Parser, Debug)]
#[command(about = "Writes the REST API's OpenAPI document")]
struct Args {
    /// Output file.
    #[arg(default_value = "openapi.json")]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let doc_json = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(&args.out, doc_json)?;
    println!("Wrote {}", args.out.display());
    Ok(())
}
