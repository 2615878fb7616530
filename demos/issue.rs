use acme_core::solver::default_registry;
use acme_core::validator::default_validator;
use acme_core::{issue, AcmeConfig, CertificateRequest, DistinguishedName, KeyPair, KeyType, PrivateKey, Solver, WebrootHttpSolver};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    /// Domains, the first one becomes the common name
    #[clap(short, required = true)]
    domains: Vec<String>,

    /// Contact info
    #[clap(short)]
    email: Option<String>,

    /// Account key (PEM), a fresh P-256 key is used if omitted
    #[clap(short)]
    account_key: Option<PathBuf>,

    /// Challenge solver: http or dns
    #[clap(short, long, default_value = "http")]
    solver: String,

    /// Serve http-01 responses from this document root instead of printing them
    #[clap(short, long)]
    webroot: Option<PathBuf>,

    /// Use Let's Encrypt production environment
    /// (see https://letsencrypt.org/docs/staging-environment/)
    #[clap(long)]
    prod: bool,
}

#[async_std::main]
async fn main() {
    simple_logger::init_with_level(log::Level::Info).unwrap();
    let args = Args::parse();

    let account_key = match &args.account_key {
        Some(path) => PrivateKey::new(std::fs::read_to_string(path).unwrap()),
        None => KeyPair::generate(KeyType::EcdsaP256).unwrap().private_key().clone(),
    };
    let mut client = AcmeConfig::new()
        .directory_lets_encrypt(args.prod)
        .client(account_key)
        .unwrap();
    client.register_account(args.email.as_deref(), None).await.unwrap();

    let registry = default_registry().unwrap();
    let webroot = args.webroot.map(WebrootHttpSolver::new);
    let solver: &dyn Solver = match &webroot {
        Some(webroot) => webroot,
        None => registry.get(&args.solver).unwrap(),
    };
    let validator = default_validator().unwrap();

    let (common_name, alternative_names) = args.domains.split_first().unwrap();
    let request = CertificateRequest::new(
        DistinguishedName::new(common_name).with_subject_alternative_names(alternative_names),
        KeyPair::generate(KeyType::EcdsaP256).unwrap(),
    );
    let response = issue(&mut client, &request, solver, &validator).await.unwrap();

    let parsed = response.certificate().parse().unwrap();
    log::info!("issued certificate {} valid until {}", parsed.serial_number, parsed.valid_to);
    println!("{}", response.certificate_request().key_pair().private_key().pem());
    println!("{}", response.certificate().full_chain_pem());
}
