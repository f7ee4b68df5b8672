use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

use crate::{
    parse_unverified, Audience, Claims, Ed25519KeyPair, InMemoryJtiStore, JtiStore, JwtError,
    JwtSigner, JwtVerifier, VerificationOptions,
};

fn sign_claims(key: &Ed25519KeyPair, claims: &mut Claims) -> String {
    JwtSigner::new(key.clone()).sign(claims).expect("jwt")
}

fn verifier_with_store(key: &Ed25519KeyPair) -> JwtVerifier {
    let store = Arc::new(InMemoryJtiStore::default());
    JwtVerifier::new([key.public_key()]).with_store(store as Arc<dyn JtiStore>)
}

#[test]
fn sign_and_verify_roundtrip() {
    let mut rng = StdRng::seed_from_u64(42);
    let key = Ed25519KeyPair::generate_with_rng("kid-1", &mut rng).expect("key");
    let mut claims = Claims::new();
    claims.issuer = Some("offline-provisioner".into());
    claims.subject = Some("internal.example.com".into());
    claims.audience = Some(Audience::Single("https://ca.internal/1.0/sign".into()));
    claims.root_fingerprint = Some("abcdef".into());
    claims.sans = vec!["internal.example.com".into()];
    claims.set_issued_now();
    claims.set_expiration_from_now(Duration::from_secs(300));
    claims.extra.insert("step".into(), json!({"ver": 1}));

    let token = sign_claims(&key, &mut claims);
    assert!(claims.jwt_id.is_some());

    let verified = verifier_with_store(&key)
        .verify(
            &token,
            &VerificationOptions {
                audience: Some("https://ca.internal/1.0/sign".into()),
                ..VerificationOptions::default()
            },
        )
        .expect("verified");
    assert_eq!(verified, claims);
}

#[test]
fn signed_token_is_readable_without_key() {
    let key = Ed25519KeyPair::generate("kid-read").expect("key");
    let mut claims = Claims::new();
    claims.subject = Some("foo.example.com".into());
    claims.audience = Some(Audience::Multiple(vec!["https://ca/1.0/sign".into()]));
    claims.root_fingerprint = Some("00ff".into());
    claims.set_expiration_from_now(Duration::from_secs(60));
    let token = sign_claims(&key, &mut claims);

    let read = parse_unverified(&token).expect("claims");
    assert_eq!(read.subject, "foo.example.com");
    assert_eq!(read.first_audience(), Some("https://ca/1.0/sign"));
    assert_eq!(read.fingerprint(), Some("00ff"));
    assert_eq!(read.jwt_id, claims.jwt_id);
}

#[test]
fn rejects_replay_in_memory_store() {
    let key = Ed25519KeyPair::generate("kid-replay").expect("key");
    let mut claims = Claims::new();
    claims.set_expiration_from_now(Duration::from_secs(60));
    let token = sign_claims(&key, &mut claims);
    let verifier = verifier_with_store(&key);
    verifier
        .verify(&token, &VerificationOptions::default())
        .expect("first use");
    let err = verifier
        .verify(&token, &VerificationOptions::default())
        .expect_err("replay");
    assert!(matches!(err, JwtError::Replay));
}

#[test]
fn rejects_wrong_audience() {
    let key = Ed25519KeyPair::generate("kid-aud").expect("key");
    let mut claims = Claims::new();
    claims.audience = Some(Audience::Single("https://a/1.0/sign".into()));
    claims.set_expiration_from_now(Duration::from_secs(60));
    let token = sign_claims(&key, &mut claims);
    let err = verifier_with_store(&key)
        .verify(
            &token,
            &VerificationOptions {
                audience: Some("https://b/1.0/sign".into()),
                ..VerificationOptions::default()
            },
        )
        .expect_err("audience");
    assert!(matches!(err, JwtError::ClaimMismatch("aud")));
}

#[test]
fn rejects_expired_token() {
    let key = Ed25519KeyPair::generate("kid-exp").expect("key");
    let mut claims = Claims::new();
    claims.set_expiration_from_now(Duration::from_secs(60));
    let token = sign_claims(&key, &mut claims);
    let later = SystemTime::now() + Duration::from_secs(3_600);
    let err = verifier_with_store(&key)
        .verify(
            &token,
            &VerificationOptions {
                now: Some(later),
                ..VerificationOptions::default()
            },
        )
        .expect_err("expired");
    assert!(matches!(err, JwtError::Expired));
}

#[test]
fn rejects_foreign_signature() {
    let key = Ed25519KeyPair::generate("kid").expect("key");
    let other = Ed25519KeyPair::generate("kid").expect("key");
    let mut claims = Claims::new();
    claims.set_expiration_from_now(Duration::from_secs(60));
    let token = sign_claims(&other, &mut claims);
    let err = verifier_with_store(&key)
        .verify(&token, &VerificationOptions::default())
        .expect_err("signature");
    assert!(matches!(err, JwtError::Signature));
}

#[test]
fn requires_store_when_jti_required() {
    let key = Ed25519KeyPair::generate("kid-store").expect("key");
    let mut claims = Claims::new();
    claims.set_expiration_from_now(Duration::from_secs(60));
    let token = sign_claims(&key, &mut claims);
    let err = JwtVerifier::new([key.public_key()])
        .verify(&token, &VerificationOptions::default())
        .expect_err("store");
    assert!(matches!(err, JwtError::JtiStore(_)));

    let relaxed = VerificationOptions {
        require_jti: false,
        ..VerificationOptions::default()
    };
    assert!(JwtVerifier::new([key.public_key()])
        .verify(&token, &relaxed)
        .is_ok());
}

#[test]
fn in_memory_store_purges_expired_entries() {
    let store = InMemoryJtiStore::default();
    let now = SystemTime::now();
    assert!(store
        .check_and_insert("short", Some(now + Duration::from_secs(1)))
        .expect("insert"));
    assert!(store.check_and_insert("forever", None).expect("insert"));
    let removed = store
        .purge_expired(now + Duration::from_secs(10))
        .expect("purge");
    assert_eq!(removed, 1);
    assert!(!store.check_and_insert("forever", None).expect("insert"));
}
