//! Cache descriptor rewriting
//!
//! Cache descriptors are comma separated `key=value` lists. CI systems put
//! placeholder tokens where cloud credentials belong; they are swapped for
//! the live values here, or dropped when no value exists.

use crate::config::CacheCredentials;

/// Placeholder value for both AWS keys
pub const AWS_PLACEHOLDER: &str = "harness_placeholder_aws_creds";

/// Placeholder value for the GCS JSON key
pub const GCP_PLACEHOLDER: &str = "harness_placeholder_gcp_creds";

fn live_value<'a>(key: &str, creds: &'a CacheCredentials) -> Option<Option<&'a str>> {
    let value = match key {
        "access_key_id" => creds.s3_access_key.as_deref(),
        "secret_access_key" => creds.s3_secret_key.as_deref(),
        "gcp_json_key" => creds.gcp_json_key.as_deref(),
        _ => return None,
    };
    Some(value.filter(|v| !v.is_empty()))
}

fn placeholder_for(key: &str) -> &'static str {
    if key == "gcp_json_key" {
        GCP_PLACEHOLDER
    } else {
        AWS_PLACEHOLDER
    }
}

/// Replace or remove credential placeholders in one descriptor
pub fn sanitize_descriptor(descriptor: &str, creds: &CacheCredentials) -> String {
    let mut fields: Vec<String> = Vec::new();
    for field in descriptor.split(',') {
        let Some((key, value)) = field.split_once('=') else {
            fields.push(field.to_string());
            continue;
        };
        let key_name = key.trim();
        match live_value(key_name, creds) {
            Some(live) if value.trim() == placeholder_for(key_name) => {
                if let Some(live) = live {
                    fields.push(format!("{}={}", key, live));
                } else {
                    tracing::debug!("Dropping {} placeholder, no credential supplied", key_name);
                }
            }
            _ => fields.push(field.to_string()),
        }
    }
    fields.join(",")
}

/// Append `use_path_style=true` to s3 descriptors that do not set it
pub fn apply_path_style(descriptor: &str) -> String {
    let mut fields = descriptor.split(',');
    let is_s3 = fields.clone().any(|f| f == "type=s3");
    let has_style = fields.any(|f| f.starts_with("use_path_style="));
    if is_s3 && !has_style {
        format!("{},use_path_style=true", descriptor)
    } else {
        descriptor.to_string()
    }
}
