//! Proxy build-arg propagation

use crate::config::ProxySettings;

/// Whether `list` already sets `key`, compared case-insensitively
pub fn has_build_arg(list: &[String], key: &str) -> bool {
    list.iter().any(|arg| {
        let name = arg.split_once('=').map_or(arg.as_str(), |(k, _)| k);
        name.eq_ignore_ascii_case(key)
    })
}

fn add_value(list: &mut Vec<String>, key: &str, value: &str) {
    if !has_build_arg(list, key) {
        list.push(format!("{}={}", key, value));
        list.push(format!("{}={}", key.to_uppercase(), value));
    }
}

/// Forward proxy settings as build args in both list formats.
///
/// Each list is checked on its own, so a key set in one list is still
/// added to the other.
pub fn add_proxy_build_args(args: &mut Vec<String>, args_new: &mut Vec<String>, proxy: &ProxySettings) {
    for key in ProxySettings::KEYS {
        if let Some(value) = proxy.get(key) {
            add_value(args, key, value);
            add_value(args_new, key, value);
        }
    }
}
