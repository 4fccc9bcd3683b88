use farm_core::AccountStore;
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> AccountStore {
    let path = dir.path().join("test.db");
    AccountStore::new(path.to_str().unwrap()).await.unwrap()
}

const ADDR: &str = "0x1111111111111111111111111111111111111111";
const KEY: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

#[tokio::test]
async fn upsert_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store.upsert_account(ADDR, KEY).await.unwrap();
    store.upsert_account(ADDR, KEY).await.unwrap();

    assert_eq!(store.count_accounts().await.unwrap(), 1);
    let record = store.get_account(ADDR).await.unwrap().unwrap();
    assert_eq!(record.address, ADDR);
    assert!(record.auth_token.is_none());
}

#[tokio::test]
async fn token_roundtrip_and_clear() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.upsert_account(ADDR, KEY).await.unwrap();

    assert!(store.get_token(ADDR).await.unwrap().is_none());

    store.save_token(ADDR, "jwt-token").await.unwrap();
    assert_eq!(store.get_token(ADDR).await.unwrap().as_deref(), Some("jwt-token"));

    // Token survives until the remote service rejects it.
    store.clear_token(ADDR).await.unwrap();
    assert!(store.get_token(ADDR).await.unwrap().is_none());
}

#[tokio::test]
async fn ws_payload_cache_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.upsert_account(ADDR, KEY).await.unwrap();

    let payload = r#"{"type":"auth","data":{"signature":"0xdead"}}"#;
    store.save_ws_payload(ADDR, payload).await.unwrap();
    assert_eq!(
        store.get_ws_payload(ADDR).await.unwrap().as_deref(),
        Some(payload)
    );

    store.clear_ws_payload(ADDR).await.unwrap();
    assert!(store.get_ws_payload(ADDR).await.unwrap().is_none());
}

#[tokio::test]
async fn referral_pool_draws_only_known_codes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    assert!(store.random_ref_code().await.unwrap().is_none());

    let mut codes = Vec::new();
    for i in 0..5 {
        let addr = format!("0x{:040x}", i + 1);
        store.upsert_account(&addr, KEY).await.unwrap();
        let code = format!("CODE{}", i);
        store.save_ref_code(&addr, &code).await.unwrap();
        codes.push(code);
    }

    for _ in 0..20 {
        let drawn = store.random_ref_code().await.unwrap().unwrap();
        assert!(codes.contains(&drawn));
    }
}

#[tokio::test]
async fn updating_missing_account_fails() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let result = store.save_token("0xdoesnotexist", "token").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn last_proxy_is_persisted() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.upsert_account(ADDR, KEY).await.unwrap();

    store
        .save_last_proxy(ADDR, "http://10.0.0.1:8080")
        .await
        .unwrap();
    let record = store.get_account(ADDR).await.unwrap().unwrap();
    assert_eq!(record.last_proxy.as_deref(), Some("http://10.0.0.1:8080"));
}

#[tokio::test]
async fn store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("persist.db");

    {
        let store = AccountStore::new(path.to_str().unwrap()).await.unwrap();
        store.upsert_account(ADDR, KEY).await.unwrap();
        store.save_token(ADDR, "durable").await.unwrap();
        store.close().await;
    }

    let store = AccountStore::new(path.to_str().unwrap()).await.unwrap();
    assert_eq!(store.get_token(ADDR).await.unwrap().as_deref(), Some("durable"));
}
