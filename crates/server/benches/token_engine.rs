use criterion::{Criterion, criterion_group, criterion_main};
use crm_auth::config::{AppConfig, ClientConfig};
use crm_auth::oauth2::challenge::ChallengeRequest;
use crm_auth::oauth2::grant::TokenRequest;
use crm_auth::oauth2::pkce::{code_challenge_s256, generate_verifier, verify_s256};
use crm_auth::oauth2::types::{GrantType, Scope};
use crm_auth::oauth2::{AuthService, AuthStores};
use std::hint::black_box;

fn bench_config() -> AppConfig {
    AppConfig {
        listen_addr: "127.0.0.1:0".into(),
        storage: Default::default(),
        database_url: "sqlite::memory:".into(),
        oauth2: Default::default(),
        lockout: Default::default(),
        superadmin: Default::default(),
        clients: vec![ClientConfig {
            client_id: "crm_spa".parse().unwrap(),
            name: "CRM SPA".into(),
            secret: None,
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            scopes: vec![Scope::Read, Scope::Write],
            pkce_required: true,
        }],
        users: vec![],
    }
}

async fn code_exchange(service: &AuthService) -> String {
    let verifier = generate_verifier();
    let challenge = service
        .issue_challenge(ChallengeRequest {
            code_challenge: code_challenge_s256(&verifier),
            code_challenge_method: None,
            state: None,
            client_id: None,
            scope: None,
        })
        .await
        .unwrap();
    service
        .grant(
            TokenRequest {
                grant_type: Some("authorization_code".into()),
                client_id: Some("crm_spa".into()),
                code: Some(challenge.challenge_id),
                code_verifier: Some(verifier),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap()
        .access
        .token
}

fn benchmark_pkce(c: &mut Criterion) {
    let verifier = generate_verifier();
    let challenge = code_challenge_s256(&verifier);

    c.bench_function("pkce_challenge_s256", |b| {
        b.iter(|| black_box(code_challenge_s256(black_box(&verifier))));
    });

    c.bench_function("pkce_verify_s256", |b| {
        b.iter(|| black_box(verify_s256(black_box(&verifier), black_box(&challenge))));
    });
}

fn benchmark_token_validation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = bench_config();
    let service = AuthService::from_config(&config, AuthStores::memory(&config.users));
    let token = rt.block_on(code_exchange(&service));

    c.bench_function("validate_access_token", |b| {
        b.iter(|| {
            let principal = rt.block_on(service.validate(black_box(&token)));
            black_box(principal).unwrap();
        });
    });

    c.bench_function("validate_unknown_token", |b| {
        b.iter(|| {
            let result = rt.block_on(service.validate(black_box("does-not-exist")));
            black_box(result).unwrap_err();
        });
    });
}

fn benchmark_code_exchange(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = bench_config();
    let service = AuthService::from_config(&config, AuthStores::memory(&config.users));

    c.bench_function("challenge_and_code_exchange", |b| {
        b.iter(|| black_box(rt.block_on(code_exchange(&service))));
    });
}

criterion_group!(
    benches,
    benchmark_pkce,
    benchmark_token_validation,
    benchmark_code_exchange
);
criterion_main!(benches);
