use std::collections::HashMap;
use std::sync::Arc;
use paramprompt::config::ClientConfig;
use paramprompt::pipeline::{Generator, Outcome};
use paramprompt::prompt::{Parameter, Template};
use paramprompt::utils::llm::openai::OpenAiClient;
use paramprompt::utils::llm::Complete;

fn get_client() -> Option<OpenAiClient> {
    let config = ClientConfig::from_env().ok()?;
    Some(OpenAiClient::new(&config))
}

#[tokio::test]
#[ignore = "requires GROQ_API_KEY"]
async fn test_validate_credential() {
    let client = get_client().expect("GROQ_API_KEY not set");
    assert!(client.validate_credential().await);
}

#[tokio::test]
#[ignore = "requires GROQ_API_KEY"]
async fn test_rejects_bad_credential() {
    let client = OpenAiClient::new(&ClientConfig::new("gsk_definitely_not_a_key"));
    assert!(!client.validate_credential().await);
}

#[tokio::test]
#[ignore = "requires GROQ_API_KEY"]
async fn test_generate_outputs() {
    let client = get_client().expect("GROQ_API_KEY not set");
    let generator = Generator::new(Arc::new(client));
    let template = Template::new(
        "greeting",
        "Greet {{name}} in two short lines. Reply with a JSON object with the keys \"greeting\" and \"language\".",
        vec![Parameter::input("name"), Parameter::output("greeting"), Parameter::output("language")],
    );
    let inputs = HashMap::from([("name".to_string(), "Ada".to_string())]);

    let outcome = generator.generate(&template, &inputs).await;
    assert!(outcome.is_ok(), "Failed: {:?}", outcome.as_ref().err());
    let Ok(Outcome::Published(result)) = outcome else {
        panic!("single request reported stale");
    };
    assert_eq!(result.outputs.len(), 2);
    assert!(!result.get("greeting").unwrap_or_default().is_empty());
    assert!(!result.get("greeting").unwrap_or_default().contains('\n'));
    println!("Response: {:?}", result);
}
