use chainsmith::bundle::{self, build_full_chain, generate_csr_bundle, parse_san_lines};
use chainsmith::cert::params::DistinguishedName;
use chainsmith::error::ChainsmithError;
use chainsmith::key::KeyKind;
use chainsmith::trust_store::SystemTrustStore;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), ChainsmithError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let algorithm = args.next().unwrap_or_else(|| "ECC".to_string());
    let size_or_curve = args.next().unwrap_or_else(|| "P-256".to_string());
    let kind = KeyKind::parse(&algorithm, &size_or_curve)?;

    // Key and request
    let subject = DistinguishedName::builder()
        .common_name("myserver.local".to_string())
        .organization("My Org".to_string())
        .country("US".to_string())
        .build();
    let sans = parse_san_lines("myserver.local\nwww.myserver.local\n192.0.2.10");
    let csr = generate_csr_bundle(kind, &subject, &sans, Some("changeit"))?;

    println!("{}:\n{}", bundle::PRIVATE_KEY_FILE, csr.private_key_pem.as_str());
    println!("{}:\n{}", bundle::CSR_FILE, csr.csr_pem);

    // Full chain for a certificate file given as the third argument
    if let Some(path) = args.next() {
        let leaf_pem = std::fs::read(&path)
            .map_err(|e| ChainsmithError::InvalidInput(format!("{path}: {e}")))?;
        let store = SystemTrustStore::load();
        if store.is_empty() {
            eprintln!("system trust store is empty, the chain will hold the input only");
        }
        let full = build_full_chain(&leaf_pem, &store)?;
        println!(
            "{} ({} certificates, {}):\n{}",
            bundle::FULL_CHAIN_FILE,
            full.chain.len(),
            full.chain.state,
            full.pem
        );
    }

    Ok(())
}
