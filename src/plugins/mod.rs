//! Built-in detection rules.

pub mod broadcast;
pub mod cert;
pub mod crypto;
pub mod exported;
pub mod file;
pub mod generic;
pub mod intent;
pub mod manifest;
pub mod webview;

use crate::error::ScanError;
use crate::rules::{Category, RuleEntry, RuleRegistry};

pub fn register_builtin(registry: &mut RuleRegistry) -> Result<(), ScanError> {
    let entries = [
        RuleEntry::new("debuggable", Category::Manifest, manifest::debuggable),
        RuleEntry::new("allow_backup", Category::Manifest, manifest::allow_backup),
        RuleEntry::new("min_sdk", Category::Manifest, manifest::min_sdk),
        RuleEntry::new("exported_components", Category::Manifest, exported::ExportedComponents::boxed),
        RuleEntry::new(
            "dynamic_broadcast_receiver",
            Category::Broadcast,
            broadcast::DynamicBroadcastReceiver::boxed,
        ),
        RuleEntry::new("android_logging", Category::File, file::AndroidLogging::boxed),
        RuleEntry::new("api_keys", Category::File, file::ApiKeys::boxed),
        RuleEntry::new("http_url_hardcoded", Category::File, file::HttpUrlHardcoded::boxed),
        RuleEntry::new("ecb_cipher", Category::Crypto, crypto::EcbCipher::boxed),
        RuleEntry::new("secure_random_seed", Category::Crypto, crypto::SecureRandomSeed::boxed),
        RuleEntry::new(
            "implicit_pending_intent",
            Category::Intent,
            intent::ImplicitPendingIntent::boxed,
        ),
        RuleEntry::new("hostname_verifier", Category::Cert, cert::HostnameVerifier::boxed),
        RuleEntry::new("javascript_enabled", Category::Webview, webview::JavascriptEnabled::boxed),
        RuleEntry::new("allow_file_access", Category::Webview, webview::AllowFileAccess::boxed),
        RuleEntry::new(
            "hardcoded_credentials",
            Category::Generic,
            generic::HardcodedCredentials::boxed,
        ),
    ];
    for entry in entries {
        registry.register(entry)?;
    }
    Ok(())
}
