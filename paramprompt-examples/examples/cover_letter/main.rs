use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Result;
use log::info;
use paramprompt::config::ClientConfig;
use paramprompt::editor::TemplateDraft;
use paramprompt::pipeline::Outcome;
use paramprompt::prompt::ParamKind;
use paramprompt::session::Session;
use paramprompt::utils::kv::{FileStore, Persistence};
use paramprompt::utils::llm::openai::OpenAiClient;

const CV: &str = "Jane Doe\n5 years as a software engineer, mostly Rust and distributed storage.";
const LISTING: &str = "Senior Backend Engineer. You will own our ingestion pipeline.";

/// Usage: `GROQ_API_KEY=... cargo run --example cover_letter [store.json]`
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let store_path = std::env::args().nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("paramprompt-store.json"));
    let persistence = Persistence::new(Arc::new(FileStore::open(&store_path)?));
    let config = ClientConfig::from_env()?;
    info!("using model {} at {}", config.model, config.api_base);
    let api_key = config.api_key().to_string();
    let client = Arc::new(OpenAiClient::new(&config));

    let mut session = Session::new(persistence, client.clone());
    if !session.set_credential(&api_key, client).await {
        anyhow::bail!("{}", session.board().error.unwrap_or_default());
    }

    let mut draft = TemplateDraft::new();
    draft.set_name("cover")
        .set_body("Write a short cover letter.\nCV: {{cv}}\nJob listing: {{listing}}\n\
                   Reply with a JSON object with the keys \"coverLetter\" and \"subject\".");
    for (name, kind) in [("cv", ParamKind::Input), ("listing", ParamKind::Input),
                         ("coverLetter", ParamKind::Output), ("subject", ParamKind::Output)] {
        draft.stage_param(name, Some(kind));
        draft.add_param()?;
    }
    session.save_template(&draft.build()?)?;

    session.select("cover");
    session.edit("cv", CV)?;
    session.edit("listing", LISTING)?;
    session.flush();

    match session.generate().await {
        Ok(Outcome::Published(result)) => {
            for output in result.outputs {
                println!("## {}\n{}\n", output.name, output.html);
            }
        }
        Ok(Outcome::Stale) => println!("superseded"),
        Err(e) => println!("generation failed: {}", e),
    }
    println!("inputs saved to {}", store_path.display());
    Ok(())
}
