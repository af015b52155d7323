//! Signed bearer tokens.
//!
//! A token is `base64url(payload) "." hex(hmac_sha256(secret, base64url(payload)))`
//! where the payload is the JSON `{"kind": ..., "sub": ..., "exp": ...}`.
//! Verification never fails loudly: every problem collapses into an
//! unauthenticated [`Verification`].

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};
use chrono::{DateTime, Duration, Utc};
use examdesk_core::identity::{Identity, Verification};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
  #[error("token secret rejected by hmac")]
  Key,

  #[error("payload encoding failed: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Kind {
  Admin,
  Teacher,
  Student,
  Report,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
  kind: Kind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  sub:  Option<Uuid>,
  /// Expiry, unix seconds.
  exp:  i64,
}

impl Claims {
  fn new(identity: Identity, exp: i64) -> Self {
    let (kind, sub) = match identity {
      Identity::Admin => (Kind::Admin, None),
      Identity::Teacher(id) => (Kind::Teacher, Some(id)),
      Identity::Student(id) => (Kind::Student, Some(id)),
      Identity::ReportViewer(id) => (Kind::Report, Some(id)),
    };
    Self { kind, sub, exp }
  }

  fn identity(&self) -> Option<Identity> {
    match (self.kind, self.sub) {
      (Kind::Admin, None) => Some(Identity::Admin),
      (Kind::Teacher, Some(id)) => Some(Identity::Teacher(id)),
      (Kind::Student, Some(id)) => Some(Identity::Student(id)),
      (Kind::Report, Some(id)) => Some(Identity::ReportViewer(id)),
      _ => None,
    }
  }
}

/// A freshly signed token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issued {
  pub token:      String,
  pub identity:   Identity,
  pub expires_at: DateTime<Utc>,
}

/// Signs and verifies tokens with one shared secret.
pub struct TokenSigner {
  secret: Vec<u8>,
}

impl TokenSigner {
  pub fn new(secret: impl Into<Vec<u8>>) -> Self { Self { secret: secret.into() } }

  fn mac(&self) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::Key)
  }

  pub fn sign(
    &self,
    identity: Identity,
    ttl: Duration,
    now: DateTime<Utc>,
  ) -> Result<Issued, TokenError> {
    let expires_at = now + ttl;
    let payload = B64.encode(serde_json::to_vec(&Claims::new(identity, expires_at.timestamp()))?);

    let mut mac = self.mac()?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(Issued { token: format!("{payload}.{signature}"), identity, expires_at })
  }

  /// Check structure, then signature, then expiry.
  ///
  /// `expired` is set only for a correctly signed token whose `exp` has
  /// passed.
  pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Verification {
    let Some((payload, signature)) = token.trim().split_once('.') else {
      return Verification::rejected();
    };
    let Ok(signature) = hex::decode(signature) else {
      return Verification::rejected();
    };
    let Ok(mut mac) = self.mac() else {
      return Verification::rejected();
    };
    mac.update(payload.as_bytes());
    if mac.verify_slice(&signature).is_err() {
      return Verification::rejected();
    }

    let Some(claims) = B64
      .decode(payload)
      .ok()
      .and_then(|bytes| serde_json::from_slice::<Claims>(&bytes).ok())
    else {
      return Verification::rejected();
    };
    if claims.exp <= now.timestamp() {
      return Verification::expired();
    }

    claims.identity().map_or_else(Verification::rejected, Verification::verified)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn signer() -> TokenSigner { TokenSigner::new("test-secret") }

  #[test]
  fn round_trips_every_identity() {
    let now = Utc::now();
    let id = Uuid::new_v4();
    for identity in [
      Identity::Admin,
      Identity::Teacher(id),
      Identity::Student(id),
      Identity::ReportViewer(id),
    ] {
      let issued = signer().sign(identity, Duration::hours(1), now).unwrap();
      let v = signer().verify(&issued.token, now);
      assert!(v.authenticated, "{identity:?}");
      assert_eq!(v.identity(), Some(identity));
      assert!(!v.expired);
    }
  }

  #[test]
  fn expired_token_with_valid_signature() {
    let then = Utc::now() - Duration::days(15);
    let issued = signer()
      .sign(Identity::ReportViewer(Uuid::new_v4()), Duration::days(14), then)
      .unwrap();

    let v = signer().verify(&issued.token, Utc::now());
    assert!(!v.authenticated);
    assert!(v.expired);
    assert_eq!(v.identity(), None);
  }

  #[test]
  fn tampered_signature_is_not_reported_as_expired() {
    let now = Utc::now();
    let issued = signer().sign(Identity::Student(Uuid::new_v4()), Duration::hours(1), now).unwrap();
    let (payload, sig) = issued.token.split_once('.').unwrap();

    let mut flipped = sig.to_owned().into_bytes();
    flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
    let tampered = format!("{payload}.{}", String::from_utf8(flipped).unwrap());

    let v = signer().verify(&tampered, now);
    assert!(!v.authenticated);
    assert!(!v.expired);
  }

  #[test]
  fn forged_payload_is_rejected() {
    let now = Utc::now();
    let issued = signer().sign(Identity::Student(Uuid::new_v4()), Duration::hours(1), now).unwrap();
    let (_, sig) = issued.token.split_once('.').unwrap();
    let forged = B64.encode(br#"{"kind":"admin","exp":99999999999}"#);

    assert!(!signer().verify(&format!("{forged}.{sig}"), now).authenticated);
  }

  #[test]
  fn other_secrets_are_rejected() {
    let now = Utc::now();
    let issued = signer().sign(Identity::Admin, Duration::hours(1), now).unwrap();
    let v = TokenSigner::new("another-secret").verify(&issued.token, now);
    assert!(!v.authenticated);
    assert!(!v.expired);
  }

  #[test]
  fn malformed_tokens_never_panic() {
    let now = Utc::now();
    for junk in ["", ".", "abc", "abc.zz", "....", "é.é", "eyJ9.00"] {
      let v = signer().verify(junk, now);
      assert!(!v.authenticated, "{junk:?}");
      assert!(!v.expired, "{junk:?}");
    }
  }
}
