//! Model name resolution and the static model catalog.
//!
//! Clients name models by OpenAI-style aliases (`gpt-4`), Anthropic-style
//! aliases (`claude-3-5-sonnet`), human-readable display names
//! (`Claude 3.5 Sonnet v2`), or native backend IDs
//! (`us.anthropic.claude-sonnet-4-5-20250929-v1:0`). [`ModelResolver`] turns
//! any of these into a backend model ID and never fails.

use serde::Serialize;
use std::collections::HashMap;

/// Region prefixes used by cross-region inference profile IDs.
const REGION_PREFIXES: &[&str] = &["us", "eu", "ap"];

/// Providers whose IDs are accepted as native backend IDs.
const KNOWN_PROVIDERS: &[&str] = &[
    "anthropic",
    "amazon",
    "meta",
    "mistral",
    "cohere",
    "ai21",
    "deepseek",
    "writer",
    "qwen",
    "openai",
    "stability",
    "twelvelabs",
    "luma",
];

const SONNET_4_5: &str = "us.anthropic.claude-sonnet-4-5-20250929-v1:0";
const HAIKU_4_5: &str = "us.anthropic.claude-haiku-4-5-20251001-v1:0";

/// Alias -> backend ID. Case-sensitive.
const ALIASES: &[(&str, &str)] = &[
    // OpenAI-style names, mapped to the closest Claude tier
    ("gpt-4", SONNET_4_5),
    ("gpt-4o", SONNET_4_5),
    ("gpt-4-turbo", SONNET_4_5),
    ("gpt-4.1", SONNET_4_5),
    ("gpt-4o-mini", HAIKU_4_5),
    ("gpt-3.5-turbo", HAIKU_4_5),
    // Anthropic
    ("claude-opus-4-6", "us.anthropic.claude-opus-4-6-v1"),
    ("claude-opus-4-1", "us.anthropic.claude-opus-4-1-20250805-v1:0"),
    ("claude-opus-4", "us.anthropic.claude-opus-4-20250514-v1:0"),
    ("claude-sonnet-4-5", SONNET_4_5),
    ("claude-sonnet-4", "us.anthropic.claude-sonnet-4-20250514-v1:0"),
    ("claude-haiku-4-5", HAIKU_4_5),
    ("claude-3-7-sonnet", "us.anthropic.claude-3-7-sonnet-20250219-v1:0"),
    ("claude-3-5-sonnet", "us.anthropic.claude-3-5-sonnet-20241022-v2:0"),
    ("claude-3-5-haiku", "us.anthropic.claude-3-5-haiku-20241022-v1:0"),
    ("claude-3-opus", "us.anthropic.claude-3-opus-20240229-v1:0"),
    ("claude-3-haiku", "us.anthropic.claude-3-haiku-20240307-v1:0"),
    // Amazon
    ("nova-premier", "us.amazon.nova-premier-v1:0"),
    ("nova-pro", "us.amazon.nova-pro-v1:0"),
    ("nova-lite", "us.amazon.nova-lite-v1:0"),
    ("nova-micro", "us.amazon.nova-micro-v1:0"),
    // DeepSeek
    ("deepseek-r1", "us.deepseek.r1-v1:0"),
    // Meta
    ("llama-3-3-70b", "us.meta.llama3-3-70b-instruct-v1:0"),
    ("llama-4-maverick", "us.meta.llama4-maverick-17b-instruct-v1:0"),
    ("llama-4-scout", "us.meta.llama4-scout-17b-instruct-v1:0"),
    // Mistral
    ("mistral-large", "mistral.mistral-large-2407-v1:0"),
    ("pixtral-large", "us.mistral.pixtral-large-2502-v1:0"),
    // Cohere
    ("command-r-plus", "cohere.command-r-plus-v1:0"),
    ("command-r", "cohere.command-r-v1:0"),
    // AI21
    ("jamba-large", "ai21.jamba-1-5-large-v1:0"),
    ("jamba-mini", "ai21.jamba-1-5-mini-v1:0"),
];

/// Display name -> backend ID. This table doubles as the `/v1/models` catalog.
const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("Claude Opus 4.6", "us.anthropic.claude-opus-4-6-v1"),
    ("Claude Opus 4.1", "us.anthropic.claude-opus-4-1-20250805-v1:0"),
    ("Claude Opus 4", "us.anthropic.claude-opus-4-20250514-v1:0"),
    ("Claude Sonnet 4.5", SONNET_4_5),
    ("Claude Sonnet 4", "us.anthropic.claude-sonnet-4-20250514-v1:0"),
    ("Claude Haiku 4.5", HAIKU_4_5),
    ("Claude 3.7 Sonnet", "us.anthropic.claude-3-7-sonnet-20250219-v1:0"),
    ("Claude 3.5 Sonnet v2", "us.anthropic.claude-3-5-sonnet-20241022-v2:0"),
    ("Claude 3.5 Sonnet", "us.anthropic.claude-3-5-sonnet-20240620-v1:0"),
    ("Claude 3.5 Haiku", "us.anthropic.claude-3-5-haiku-20241022-v1:0"),
    ("Claude 3 Opus", "us.anthropic.claude-3-opus-20240229-v1:0"),
    ("Claude 3 Haiku", "us.anthropic.claude-3-haiku-20240307-v1:0"),
    ("Nova Premier", "us.amazon.nova-premier-v1:0"),
    ("Nova Pro", "us.amazon.nova-pro-v1:0"),
    ("Nova Lite", "us.amazon.nova-lite-v1:0"),
    ("Nova Micro", "us.amazon.nova-micro-v1:0"),
    ("DeepSeek-R1", "us.deepseek.r1-v1:0"),
    ("Llama 3.3 70B Instruct", "us.meta.llama3-3-70b-instruct-v1:0"),
    ("Llama 4 Maverick 17B Instruct", "us.meta.llama4-maverick-17b-instruct-v1:0"),
    ("Llama 4 Scout 17B Instruct", "us.meta.llama4-scout-17b-instruct-v1:0"),
    ("Mistral Large (24.02)", "mistral.mistral-large-2402-v1:0"),
    ("Mistral Large (24.07)", "mistral.mistral-large-2407-v1:0"),
    ("Pixtral Large (25.02)", "us.mistral.pixtral-large-2502-v1:0"),
    ("Command R+", "cohere.command-r-plus-v1:0"),
    ("Command R", "cohere.command-r-v1:0"),
    ("Jamba 1.5 Large", "ai21.jamba-1-5-large-v1:0"),
    ("Jamba 1.5 Mini", "ai21.jamba-1-5-mini-v1:0"),
];

/// Model families (region prefix stripped) that accept image input.
const IMAGE_CAPABLE_PREFIXES: &[&str] = &[
    "anthropic.claude-3-haiku",
    "anthropic.claude-3-sonnet",
    "anthropic.claude-3-opus",
    "anthropic.claude-3-5-sonnet",
    "anthropic.claude-3-7-sonnet",
    "anthropic.claude-sonnet-4",
    "anthropic.claude-opus-4",
    "anthropic.claude-haiku-4-5",
    "amazon.nova-premier",
    "amazon.nova-pro",
    "amazon.nova-lite",
    "meta.llama3-2-11b",
    "meta.llama3-2-90b",
    "meta.llama4-maverick",
    "meta.llama4-scout",
    "mistral.pixtral",
];

/// Resolves client-supplied model names to backend model IDs.
///
/// Tiers, first match wins:
/// 1. empty name -> default
/// 2. native ID (`provider.rest` or `region.provider.rest`) -> unchanged
/// 3. configured extra aliases, then the built-in alias table
/// 4. display-name table
/// 5. default
#[derive(Debug, Clone)]
pub struct ModelResolver {
    default_model: String,
    extra_aliases: HashMap<String, String>,
}

impl ModelResolver {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            extra_aliases: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.extra_aliases = aliases;
        self
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> String {
        if name.is_empty() {
            return self.default_model.clone();
        }

        if is_native_id(name) {
            return name.to_string();
        }

        if let Some(id) = self.extra_aliases.get(name) {
            return id.clone();
        }

        if let Some(id) = lookup(ALIASES, name) {
            return id.to_string();
        }

        if let Some(id) = lookup(DISPLAY_NAMES, name) {
            return id.to_string();
        }

        self.default_model.clone()
    }
}

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Whether `name` looks like a native backend ID.
#[must_use]
pub fn is_native_id(name: &str) -> bool {
    let mut parts = name.splitn(3, '.');
    let first = parts.next().unwrap_or_default();
    let second = parts.next();
    let third = parts.next();

    let provider_then_rest = |provider: &str, rest: Option<&str>| {
        KNOWN_PROVIDERS.contains(&provider) && rest.is_some_and(|r| !r.is_empty())
    };

    if REGION_PREFIXES.contains(&first) {
        if let Some(provider) = second {
            return provider_then_rest(provider, third);
        }
        return false;
    }

    // `provider.rest` where rest may itself contain dots
    let rest = name.split_once('.').map(|(_, rest)| rest);
    provider_then_rest(first, rest)
}

/// Whether the backend model accepts image content.
#[must_use]
pub fn supports_image_input(model_id: &str) -> bool {
    let base = strip_region_prefix(model_id);
    IMAGE_CAPABLE_PREFIXES
        .iter()
        .any(|prefix| base.starts_with(prefix))
}

fn strip_region_prefix(model_id: &str) -> &str {
    match model_id.split_once('.') {
        Some((region, rest)) if REGION_PREFIXES.contains(&region) => rest,
        _ => model_id,
    }
}

/// Derive the owning provider from a backend model ID.
///
/// Handles both plain IDs (`anthropic.claude-…`) and cross-region inference
/// profile IDs (`us.anthropic.…`).
#[must_use]
pub fn owned_by(model_id: &str) -> String {
    let parts: Vec<&str> = model_id.splitn(3, '.').collect();
    let first = parts.first().copied().unwrap_or_default();
    if REGION_PREFIXES.contains(&first) && parts.len() >= 2 {
        return parts[1].to_string();
    }
    first.to_string()
}

/// One entry of the static model catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub model_id: &'static str,
}

/// All display names with their backend IDs, sorted by display name.
#[must_use]
pub fn catalog() -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = DISPLAY_NAMES
        .iter()
        .map(|(name, model_id)| CatalogEntry { name, model_id })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(b.name));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ModelResolver {
        ModelResolver::new(SONNET_4_5)
    }

    #[test]
    fn test_openai_aliases() {
        let r = resolver();
        assert_eq!(r.resolve("gpt-4"), SONNET_4_5);
        assert_eq!(r.resolve("gpt-4o"), SONNET_4_5);
        assert_eq!(r.resolve("gpt-4-turbo"), SONNET_4_5);
        assert_eq!(r.resolve("gpt-3.5-turbo"), HAIKU_4_5);
    }

    #[test]
    fn test_vendor_aliases() {
        let r = resolver();
        assert_eq!(
            r.resolve("claude-3-5-sonnet"),
            "us.anthropic.claude-3-5-sonnet-20241022-v2:0"
        );
        assert_eq!(r.resolve("claude-opus-4-6"), "us.anthropic.claude-opus-4-6-v1");
        assert_eq!(r.resolve("nova-pro"), "us.amazon.nova-pro-v1:0");
        assert_eq!(r.resolve("nova-micro"), "us.amazon.nova-micro-v1:0");
        assert_eq!(r.resolve("deepseek-r1"), "us.deepseek.r1-v1:0");
        assert_eq!(r.resolve("mistral-large"), "mistral.mistral-large-2407-v1:0");
        assert_eq!(r.resolve("command-r-plus"), "cohere.command-r-plus-v1:0");
        assert_eq!(r.resolve("jamba-large"), "ai21.jamba-1-5-large-v1:0");
        assert_eq!(
            r.resolve("llama-4-maverick"),
            "us.meta.llama4-maverick-17b-instruct-v1:0"
        );
    }

    #[test]
    fn test_native_ids_pass_through() {
        let r = resolver();
        for id in [
            "us.anthropic.claude-3-opus-20240229-v1:0",
            "amazon.titan-text-express-v1",
            "us.amazon.nova-pro-v1:0",
            "us.deepseek.r1-v1:0",
            "us.meta.llama3-3-70b-instruct-v1:0",
            "mistral.mistral-large-2407-v1:0",
            "cohere.command-r-plus-v1:0",
            "eu.anthropic.claude-3-haiku-20240307-v1:0",
        ] {
            assert_eq!(r.resolve(id), id);
        }
    }

    #[test]
    fn test_media_provider_ids_pass_through() {
        let r = resolver();
        for id in [
            "stability.sd3-5-large-v1:0",
            "us.stability.stable-image-core-v1:1",
            "twelvelabs.marengo-embed-2-7-v1:0",
            "us.twelvelabs.pegasus-1-2-v1:0",
            "luma.ray-v2:0",
        ] {
            assert!(is_native_id(id), "{id} not recognised");
            assert_eq!(r.resolve(id), id);
        }
    }

    #[test]
    fn test_display_names() {
        let r = resolver();
        assert_eq!(
            r.resolve("Claude 3.5 Sonnet v2"),
            "us.anthropic.claude-3-5-sonnet-20241022-v2:0"
        );
        assert_eq!(r.resolve("Nova Pro"), "us.amazon.nova-pro-v1:0");
        assert_eq!(r.resolve("DeepSeek-R1"), "us.deepseek.r1-v1:0");
        assert_eq!(
            r.resolve("Mistral Large (24.02)"),
            "mistral.mistral-large-2402-v1:0"
        );
        assert_eq!(r.resolve("Command R+"), "cohere.command-r-plus-v1:0");
        assert_eq!(r.resolve("Jamba 1.5 Large"), "ai21.jamba-1-5-large-v1:0");
    }

    #[test]
    fn test_fallback_to_default() {
        let r = resolver();
        assert_eq!(r.resolve(""), SONNET_4_5);
        assert_eq!(r.resolve("some-unknown-model"), SONNET_4_5);
        // aliases are case-sensitive
        assert_eq!(r.resolve("GPT-3.5-TURBO"), SONNET_4_5);
        // a dotted name with an unknown provider is not native
        assert_eq!(r.resolve("foo.bar"), SONNET_4_5);
        assert_eq!(r.resolve("us.anthropic."), SONNET_4_5);
    }

    #[test]
    fn test_extra_aliases_take_precedence() {
        let r = resolver().with_aliases(HashMap::from([(
            "gpt-4".to_string(),
            "us.amazon.nova-pro-v1:0".to_string(),
        )]));
        assert_eq!(r.resolve("gpt-4"), "us.amazon.nova-pro-v1:0");
    }

    #[test]
    fn test_resolve_is_idempotent_and_total() {
        let r = resolver();
        let inputs = ALIASES
            .iter()
            .chain(DISPLAY_NAMES.iter())
            .flat_map(|(k, v)| [*k, *v])
            .chain(["", "nonsense", "gpt-5", "us.", "."]);
        for input in inputs {
            let once = r.resolve(input);
            assert!(!once.is_empty(), "empty resolution for {input:?}");
            assert_eq!(r.resolve(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_image_capabilities() {
        assert!(supports_image_input(SONNET_4_5));
        assert!(supports_image_input("anthropic.claude-3-haiku-20240307-v1:0"));
        assert!(supports_image_input("us.amazon.nova-pro-v1:0"));
        assert!(!supports_image_input("us.amazon.nova-micro-v1:0"));
        assert!(!supports_image_input("us.anthropic.claude-3-5-haiku-20241022-v1:0"));
        assert!(!supports_image_input("some-model"));
    }

    #[test]
    fn test_owned_by() {
        assert_eq!(owned_by("anthropic.claude-3-haiku-20240307-v1:0"), "anthropic");
        assert_eq!(owned_by("amazon.nova-pro-v1:0"), "amazon");
        assert_eq!(owned_by("us.anthropic.claude-sonnet-4-6"), "anthropic");
        assert_eq!(owned_by("eu.anthropic.claude-3-haiku-20240307-v1:0"), "anthropic");
        assert_eq!(owned_by("ap.amazon.nova-lite-v1:0"), "amazon");
    }

    #[test]
    fn test_catalog_sorted_and_complete() {
        let entries = catalog();
        assert_eq!(entries.len(), DISPLAY_NAMES.len());
        assert!(entries.windows(2).all(|w| w[0].name <= w[1].name));
        assert!(entries.iter().any(|e| e.name == "Claude 3 Haiku"));
        assert!(entries.iter().any(|e| e.name == "Nova Micro"));
    }
}
