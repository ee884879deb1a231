//! Weak use of the Java crypto APIs.

use tracing::debug;
use tree_sitter::Node;

use crate::issue::Severity;
use crate::rule_core;
use crate::rules::java::{self, Construction, MethodCall};
use crate::rules::{Category, NodeRule, ParsedSource, Rule, RuleCore};

/// Transformations that fall back to ECB mode when no mode is given.
const ECB_BY_DEFAULT: [&str; 3] = ["AES", "DES", "DESede"];

fn is_ecb_transformation(transformation: &str) -> bool {
    let mut parts = transformation.split('/');
    let algorithm = parts.next().unwrap_or_default().trim();
    match parts.next() {
        Some(mode) => mode.trim().eq_ignore_ascii_case("ECB"),
        None => ECB_BY_DEFAULT.iter().any(|a| a.eq_ignore_ascii_case(algorithm)),
    }
}

pub struct EcbCipher {
    core: RuleCore,
}

impl EcbCipher {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "ecb_cipher",
                Category::Crypto,
                "Cipher.getInstance with ECB mode, explicit or implied",
            ),
        })
    }
}

impl NodeRule for EcbCipher {
    fn wants(&self, source: &ParsedSource<'_>) -> anyhow::Result<bool> {
        Ok(source.text.contains("Cipher"))
    }

    fn visit<'t>(
        &mut self,
        _ancestors: &[Node<'t>],
        node: Node<'t>,
        source: &ParsedSource<'t>,
    ) -> anyhow::Result<()> {
        let Some(call) = MethodCall::from_node(node, source.text) else {
            return Ok(());
        };
        if call.name != "getInstance" || !call.is_on("Cipher", source.text) {
            return Ok(());
        }
        let Some(transformation) = call
            .argument(0)
            .and_then(|arg| java::string_value(arg, source.text))
        else {
            debug!(file = %source.path.display(), "Cipher transformation is not a literal");
            return Ok(());
        };
        if !is_ecb_transformation(transformation) {
            return Ok(());
        }

        let issue = self
            .core
            .issue(
                "ECB Cipher Usage",
                Severity::Vulnerability,
                format!(
                    "Cipher.getInstance(\"{}\") uses ECB mode. ECB encrypts identical blocks to identical \
                     ciphertext and leaks data patterns. Use an authenticated mode such as AES/GCM/NoPadding.",
                    transformation
                ),
            )
            .in_file(source.path)
            .at(source.location(node))
            .with_standard("MSTG-CRYPTO-2", "The app uses proven implementations of cryptographic primitives.")
            .with_owasp(&["M6"]);
        self.core.push(issue);
        Ok(())
    }
}

impl Rule for EcbCipher {
    rule_core!();

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
        Some(self)
    }
}

const SECURE_RANDOM_IMPORTS: [&str; 2] = ["java.security.SecureRandom", "java.security.*"];

/// `SecureRandom` seeded with caller-supplied data becomes predictable.
pub struct SecureRandomSeed {
    core: RuleCore,
}

impl SecureRandomSeed {
    pub fn boxed() -> Box<dyn Rule> {
        Box::new(Self {
            core: RuleCore::new(
                "secure_random_seed",
                Category::Crypto,
                "SecureRandom instances seeded with fixed values",
            ),
        })
    }

    fn report(&mut self, node: Node<'_>, source: &ParsedSource<'_>, what: &str) {
        let issue = self
            .core
            .issue(
                "Insecure SecureRandom Seeding",
                Severity::Vulnerability,
                format!(
                    "{} supplies its own seed to SecureRandom. A fixed or guessable seed makes the output \
                     predictable. Let SecureRandom seed itself.",
                    what
                ),
            )
            .in_file(source.path)
            .at(source.location(node))
            .with_standard("MSTG-CRYPTO-4", "The app does not use insecure random number generation.")
            .with_owasp(&["M6"]);
        self.core.push(issue);
    }
}

impl NodeRule for SecureRandomSeed {
    fn wants(&self, source: &ParsedSource<'_>) -> anyhow::Result<bool> {
        let imports = java::imports(source.tree.root_node(), source.text);
        Ok(imports.iter().any(|i| SECURE_RANDOM_IMPORTS.contains(i)))
    }

    fn visit<'t>(
        &mut self,
        _ancestors: &[Node<'t>],
        node: Node<'t>,
        source: &ParsedSource<'t>,
    ) -> anyhow::Result<()> {
        if let Some(call) = MethodCall::from_node(node, source.text) {
            if call.name == "setSeed" && !call.arguments.is_empty() {
                self.report(node, source, "A call to setSeed");
            }
        } else if let Some(creation) = Construction::from_node(node, source.text) {
            if creation.type_name == "SecureRandom" && !creation.arguments.is_empty() {
                self.report(node, source, "The SecureRandom constructor");
            }
        }
        Ok(())
    }
}

impl Rule for SecureRandomSeed {
    rule_core!();

    fn as_node(&mut self) -> Option<&mut dyn NodeRule> {
        Some(self)
    }
}
