//! Signer Scripts
//!
//! The wallet library and the glue that exposes `window.wax_login` /
//! `window.wax_transact` are read from disk once at startup and shared by
//! every account loop. Nothing mutates them after `init`.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::OnceCell;
use tracing::info;

use super::error::RelayError;

static SCRIPTS: OnceCell<SignerScripts> = OnceCell::new();

/// Cached script text
#[derive(Debug, Clone, PartialEq)]
pub struct SignerScripts {
    /// Wallet library, base64 so it survives being embedded in a JS string
    library_b64: String,
    /// Glue defining the `wax_*` helpers on `window`
    glue: String,
}

impl SignerScripts {
    pub fn from_sources(library: &str, glue: &str) -> Self {
        Self {
            library_b64: STANDARD.encode(library.as_bytes()),
            glue: glue.to_string(),
        }
    }

    fn load(library: &Path, glue: &Path) -> Result<Self, RelayError> {
        let library_text = std::fs::read_to_string(library).map_err(|e| {
            RelayError::Config(format!("signer library {}: {}", library.display(), e))
        })?;
        let glue_text = std::fs::read_to_string(glue)
            .map_err(|e| RelayError::Config(format!("signer glue {}: {}", glue.display(), e)))?;
        Ok(Self::from_sources(&library_text, &glue_text))
    }

    /// Appends the wallet library to `document.head`
    pub fn library_injection(&self) -> String {
        format!(
            "var s = document.createElement('script');\
             s.type = 'text/javascript';\
             s.text = atob('{}');\
             document.head.appendChild(s);",
            self.library_b64
        )
    }

    /// Creates `window.mywax` for `rpc_domain`, then runs the glue
    pub fn glue_for(&self, rpc_domain: &str) -> String {
        let endpoint = serde_json::Value::String(rpc_domain.to_string());
        format!(
            "window.mywax = new waxjs.WaxJS({{rpcEndpoint: {}}});{}",
            endpoint, self.glue
        )
    }
}

/// Load the scripts once. Later calls return the first load.
pub fn init(library: &Path, glue: &Path) -> Result<&'static SignerScripts, RelayError> {
    let scripts = SCRIPTS.get_or_try_init(|| SignerScripts::load(library, glue))?;
    info!(
        library = %library.display(),
        glue = %glue.display(),
        "Signer scripts loaded"
    );
    Ok(scripts)
}

/// Scripts loaded by [`init`]
pub fn get() -> Result<&'static SignerScripts, RelayError> {
    SCRIPTS
        .get()
        .ok_or_else(|| RelayError::Unrecoverable("signer scripts were not initialized".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_library_injection_is_base64() {
        let scripts = SignerScripts::from_sources("var waxjs = {};", "window.wax_login = 1;");
        let injection = scripts.library_injection();

        assert!(injection.contains("atob('dmFyIHdheGpzID0ge307')"));
        assert!(injection.contains("document.head.appendChild(s);"));
    }

    #[test]
    fn test_glue_quotes_endpoint() {
        let scripts = SignerScripts::from_sources("", "window.wax_login = 1;");
        let glue = scripts.glue_for("https://wax.greymass.com");

        assert_eq!(
            glue,
            "window.mywax = new waxjs.WaxJS({rpcEndpoint: \"https://wax.greymass.com\"});window.wax_login = 1;"
        );
    }

    #[test]
    fn test_init_once() {
        let dir = tempfile::tempdir().unwrap();
        let library = dir.path().join("waxjs.js");
        let glue = dir.path().join("inject.js");
        std::fs::File::create(&library)
            .unwrap()
            .write_all(b"var waxjs = {};")
            .unwrap();
        std::fs::File::create(&glue)
            .unwrap()
            .write_all(b"window.wax_login = 1;")
            .unwrap();

        let first = init(&library, &glue).unwrap();
        // second init ignores new paths and keeps the cached text
        let second = init(Path::new("/nonexistent/a.js"), Path::new("/nonexistent/b.js")).unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(first, get().unwrap()));
    }
}
