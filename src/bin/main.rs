use multimodal_assistant_router::{
    generation::ScriptedGenerator,
    models::ConversationTurn,
    router::IntentRouter,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Assistant router demo starting");

    // Scripted generator keeps the demo deterministic and offline
    let generator = Arc::new(ScriptedGenerator::new());
    let router = IntentRouter::new(generator);

    let article = "The committee published its annual report on regional \
water usage. Consumption fell for the third consecutive year, driven by \
new irrigation rules and metering. The report recommends extending the \
program to neighboring districts.";

    let samples = [
        ("Summarize this for me", article),
        ("", article),
        ("hello", ""),
    ];

    for (query, extracted_text) in samples {
        let history = if query.is_empty() {
            vec![]
        } else {
            vec![ConversationTurn::user(query)]
        };

        match router.run(query, history, extracted_text).await {
            Ok(outcome) => {
                println!("\n=== QUERY: {:?} ===", query);
                println!("Intent: {}", outcome.intent);
                println!("{}", outcome.final_response);
            }
            Err(e) => {
                eprintln!("Routing failed for {:?}: {}", query, e);
                return Err(Box::new(e) as Box<dyn std::error::Error>);
            }
        }
    }

    Ok(())
}
