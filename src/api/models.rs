use crate::api::{ModelEntry, ModelsResponse};
use crate::utils::url::construct_api_url;

/// Fetch the models available on the local inference server.
///
/// Used to populate the settings selector and the `models` subcommand.
pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<ModelsResponse, Box<dyn std::error::Error>> {
    let tags_url = construct_api_url(base_url, "api/tags");
    let response = client.get(tags_url).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("model listing failed with status {status}: {error_text}").into());
    }

    let models_response = response.json::<ModelsResponse>().await?;
    Ok(models_response)
}

/// Sort models by name for a stable selector and listing.
pub fn sort_models(models: &mut [ModelEntry]) {
    models.sort_by(|a, b| a.name.cmp(&b.name));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ModelEntry {
        ModelEntry {
            name: name.to_string(),
            model: None,
            modified_at: None,
            size: None,
        }
    }

    #[test]
    fn sort_models_orders_by_name() {
        let mut models = vec![entry("mistral"), entry("gemma2"), entry("deepseek-r1")];
        sort_models(&mut models);
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["deepseek-r1", "gemma2", "mistral"]);
    }
}
