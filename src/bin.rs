use std::{path::PathBuf, process, time::Duration};

use clap::Parser;
use flexi_logger::Logger;
use log::debug;
use startcom_rs::{
    config::{Config, Credentials, Endpoint, RetryConfig},
    error::{Error, ErrorKind},
    generate_cert_for_domain,
    types::CertType,
    util::{save_certificates, DEFAULT_KEY_BITS},
};

/// Requests a certificate from the StartCom API (StartAPI).
///
/// The API token and the password of the client certificate bundle are read
/// from STARTCOM_API_TOKEN_ID and STARTCOM_API_CERT_PASSWORD.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// The domain to request the certificate for
    #[clap(short, long)]
    domain: String,
    /// Type of certificate to generate: dvssl, ovssl, evssl or ivssl
    #[clap(long = "type", default_value = "dvssl")]
    cert_type: CertType,
    /// How many bits for the RSA key? 2048, 4096, more?
    #[clap(short = 'b', long = "bits", default_value_t = DEFAULT_KEY_BITS)]
    key_bits: u32,
    /// Test mode, generates one day certificates against the test API
    #[clap(long)]
    test: bool,
    /// A different API url, e.g. a staging server
    #[clap(short, long, conflicts_with = "test")]
    server: Option<String>,
    /// The PKCS#12 bundle holding the API client certificate
    #[clap(long, parse(from_os_str), default_value = "cert.p12")]
    bundle: PathBuf,
    /// Directory the certificate and key files are written to
    #[clap(long, parse(from_os_str), default_value = ".")]
    out_dir: PathBuf,
    /// Request timeout in seconds
    #[clap(long, default_value_t = 30)]
    timeout: u64,
    /// How often a request that did not reach the API is retried
    #[clap(long, default_value_t = 3)]
    retries: u32,
    /// Enables debug output.
    #[clap(short, long)]
    verbose: bool,
}

fn main() {
    // parse the cmd arguments
    let opts: Opts = Opts::parse();

    Logger::with_str(if opts.verbose { "debug" } else { "warn" })
        .log_target(flexi_logger::LogTarget::StdErr)
        .start()
        .unwrap_or_else(|e| panic!("Logger initialization failed with {}", e));

    let domain = opts.domain.trim().to_owned();
    let code = match run(&opts, &domain) {
        Ok(()) => 0,
        Err(e) => report(&domain, e),
    };

    process::exit(code);
}

fn run(opts: &Opts, domain: &str) -> Result<(), Error> {
    let config = build_config(opts)?;
    debug!("Running with {:?}", config);

    println!("Generating Key and Certificate for domains: {}", domain);
    let issued = generate_cert_for_domain(&config, domain)?;

    println!("Successfully generated cert and key for: {}", domain);
    save_certificates(&opts.out_dir, &issued)?;

    Ok(())
}

fn build_config(opts: &Opts) -> Result<Config, Error> {
    let credentials = Credentials::from_env()?;

    let endpoint = match (&opts.server, opts.test) {
        (Some(url), _) => Endpoint::custom(url)?,
        (None, true) => Endpoint::Test,
        (None, false) => Endpoint::Production,
    };

    Ok(Config::new(credentials)
        .endpoint(endpoint)
        .bundle_path(&opts.bundle)
        .key_bits(opts.key_bits)
        .cert_type(opts.cert_type)
        .timeout(Duration::from_secs(opts.timeout))
        .retry(RetryConfig::default().max_retries(opts.retries)))
}

/// Prints the error and returns the exit code for it.
fn report(domain: &str, error: Error) -> i32 {
    match error.kind() {
        ErrorKind::Application => {
            println!("Failed to generate cert and key for: {}", domain);
            if let Error::Rejected { message, .. } = &error {
                println!("Startcom returned the error: {}", message);
            }
            debug!("{}", error);
            2
        }
        ErrorKind::Environmental | ErrorKind::Transient => {
            eprintln!("Error: {}", error);
            1
        }
    }
}
