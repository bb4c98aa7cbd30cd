//! One-shot token verification harness.
//!
//! Verifies a token against an audience. Verification completes on the
//! verifier's worker context; the main thread blocks in a synchronizer
//! until the callback posts the outcome. Exit code is 0 on verification
//! success, 1 otherwise.
//!
//! ```bash
//! cargo run -p token_verify -- --jwt <token> --aud <audience>
//! ```

use std::process::ExitCode;

use clap::Parser;

use batchrpc::{ClaimsVerifier, Runtime, Synchronizer};

#[derive(Parser, Debug)]
#[command(name = "token_verify")]
#[command(about = "Verify a web token against an audience")]
struct Args {
    /// JSON web token to verify
    #[arg(long, default_value = "")]
    jwt: String,

    /// Audience the token must be addressed to
    #[arg(long, default_value = "")]
    aud: String,
}

fn validate_flags(args: &Args) -> bool {
    !args.jwt.is_empty() && !args.aud.is_empty()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    if !validate_flags(&args) {
        eprintln!("Missing or invalid arguments: --jwt and --aud are both required");
        return ExitCode::FAILURE;
    }

    let runtime = Runtime::init();
    let verifier = ClaimsVerifier::new(&runtime);
    let (sync, handle) = Synchronizer::new();

    verifier.verify(&args.jwt, &args.aud, move |status, claims| {
        let ok = status.is_ok();
        if ok {
            let claims = claims.expect("claims are present on success");
            println!("Claims:\n\n{}", claims.to_pretty_json());
        } else {
            eprintln!("Verification failed with error {}", status);
        }
        handle.post(ok);
    });

    if sync.wait() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
