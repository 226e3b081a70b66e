/// Decision schema shown to the model.
fn decision_schema() -> String {
    let example = serde_json::json!({
        "action": "buy | sell | hold | close",
        "symbol": "<one of config.allowed_symbols>",
        "quantity": "12.5",
        "price": "<optional limit price, omit to trade at the market quote>",
        "confidence": 0.75,
        "rationale": "<concise reasoning>",
        "stop_loss": "<optional>",
        "take_profit": "<optional>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

pub fn decision_system_prompt() -> String {
    format!(
        "You are an autonomous trading agent. Each request is one decision cycle for a single \
         agent and contains its configuration, strategy, a market snapshot, a portfolio \
         snapshot and memory entries.\n\n\
         ## RULES\n\n\
         - Trade only symbols listed in `config.allowed_symbols`.\n\
         - The cost of a buy or sell (quantity x price) must not exceed \
         `portfolio.cash x config.max_risk_per_trade`.\n\
         - Use `price` from `market.quotes` unless you want a limit order.\n\
         - `close` exits the whole position in `symbol`; quantity is ignored.\n\
         - When the snapshot is marked `degraded`, or nothing stands out, choose `hold`.\n\
         - Always give a rationale.\n\n\
         ## OUTPUT\n\n\
         Respond with a single JSON object and nothing else:\n\n{}\n",
        decision_schema()
    )
}
