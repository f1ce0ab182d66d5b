//! `crypto.randomUUID()` and `crypto.getRandomValues()`.

use bytes::Bytes;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{ScriptError, require_args};
use crate::install::{Installable, Namespace};
use crate::value::JsValue;

/// Largest request `getRandomValues` accepts, in bytes.
pub const MAX_RANDOM_BYTES: usize = 65_536;

/// A random (version 4) UUID in lowercase hyphenated form.
pub fn random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `len` bytes from the operating system's CSPRNG.
pub fn random_bytes(len: usize) -> Result<Bytes, ScriptError> {
    if len > MAX_RANDOM_BYTES {
        return Err(ScriptError::dom_exception(
            format!(
                "The ArrayBufferView's byte length ({len}) exceeds the number of bytes of entropy available via this API ({MAX_RANDOM_BYTES})."
            ),
            "QuotaExceededError",
        ));
    }
    let mut buf = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| ScriptError::execute("Crypto", "getRandomValues", e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Fill a typed-array view with random bytes.
///
/// Script byte views are immutable values here, so the filled view is
/// returned rather than written in place.
pub fn get_random_values(view: &JsValue) -> Result<JsValue, ScriptError> {
    match view {
        JsValue::Bytes(bytes) => random_bytes(bytes.len()).map(JsValue::Bytes),
        _ => Err(ScriptError::execute(
            "Crypto",
            "getRandomValues",
            "parameter 1 is not of type 'ArrayBufferView'.",
        )),
    }
}

/// Installs `crypto.randomUUID` and `crypto.getRandomValues`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CryptoInstaller;

impl Installable for CryptoInstaller {
    fn install(&self, namespace: &mut Namespace) {
        namespace
            .define_function("crypto.randomUUID", |_args| Ok(random_uuid().into()))
            .define_function("crypto.getRandomValues", |args| {
                require_args(args, 1, "Crypto", "getRandomValues")?;
                get_random_values(&args[0])
            });
    }
}
