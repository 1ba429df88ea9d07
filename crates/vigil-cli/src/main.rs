use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use vigil_core::types::{EnrollOutcome, PresenceOutcome, VerificationOutcome};
use vigil_core::{DisabledBackend, EncodedImage, OnnxBackend, Verifier};
use vigil_store::Store;

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil face verification CLI")]
struct Cli {
    /// Path to the SQLite database (defaults to the daemon's).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Directory containing the ONNX model files.
    #[arg(long)]
    models: Option<PathBuf>,
    /// Run without the inference backend (fallback comparison only).
    #[arg(long)]
    no_backend: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face reference from an image file
    Enroll {
        /// User the reference belongs to
        #[arg(short, long)]
        user: String,
        /// Path to the image file (PNG or JPEG)
        image: PathBuf,
        /// Supersede the user's existing references
        #[arg(long)]
        replace: bool,
    },
    /// Verify an image against a user's stored references
    Verify {
        #[arg(short, long)]
        user: String,
        image: PathBuf,
        /// Similarity tolerance override
        #[arg(short, long)]
        tolerance: Option<f32>,
    },
    /// Check whether an image contains a face
    Detect { image: PathBuf },
    /// List a user's active references
    List {
        #[arg(short, long)]
        user: String,
    },
    /// Soft-delete a reference
    Remove {
        #[arg(short, long)]
        user: String,
        /// Reference ID to remove
        id: String,
    },
    /// Show recent verification attempts for a user
    Log {
        #[arg(short, long)]
        user: String,
        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show database and backend status
    Status,
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("vigil")
}

fn load_image(path: &PathBuf) -> Result<EncodedImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    EncodedImage::from_bytes(bytes).context("image payload is empty")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db_path = cli
        .db
        .or_else(|| std::env::var("VIGIL_DB_PATH").map(PathBuf::from).ok())
        .unwrap_or_else(|| default_data_dir().join("vigil.db"));
    let model_dir = cli
        .models
        .or_else(|| std::env::var("VIGIL_MODEL_DIR").map(PathBuf::from).ok())
        .unwrap_or_else(|| default_data_dir().join("models"));

    let store = Store::open(&db_path)
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;

    let verifier = if cli.no_backend {
        Verifier::new(Box::new(DisabledBackend))
    } else {
        Verifier::new(Box::new(OnnxBackend::new(&model_dir)))
    };

    match cli.command {
        Commands::Enroll { user, image, replace } => {
            let encoded = load_image(&image)?;
            match verifier.prepare_enrollment(&encoded) {
                EnrollOutcome::Ready { representation, model_label, quality } => {
                    if replace {
                        let superseded = store.deactivate_all(&user).await?;
                        if superseded > 0 {
                            println!("superseded {superseded} existing reference(s)");
                        }
                    }
                    let kind = representation.kind();
                    let reference = store
                        .insert_reference(&user, representation, &model_label)
                        .await?;
                    store
                        .append_audit(
                            &user,
                            "face_enrolled",
                            serde_json::json!({
                                "reference_id": reference.id.clone(),
                                "kind": kind.as_str(),
                                "source": "cli",
                            }),
                        )
                        .await?;
                    println!(
                        "enrolled {} for {user} ({}, quality {quality:.2})",
                        reference.id,
                        kind.as_str()
                    );
                }
                EnrollOutcome::NoFaceDetected => {
                    println!("no face detected in {}", image.display());
                    std::process::exit(1);
                }
                EnrollOutcome::LowQuality { score } => {
                    println!("capture quality too low ({score:.2}); use a clearer photo");
                    std::process::exit(1);
                }
                EnrollOutcome::InputInvalid { reason } => {
                    println!("invalid image: {reason}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Verify { user, image, tolerance } => {
            let encoded = load_image(&image)?;
            let references = store.active_references(&user).await?;
            let tolerance = tolerance.unwrap_or(verifier.tolerance());
            let outcome = verifier.verify(&references, &encoded, tolerance);

            store
                .append_audit(
                    &user,
                    outcome.audit_action(),
                    serde_json::json!({ "source": "cli" }),
                )
                .await?;

            match outcome {
                VerificationOutcome::Verified { similarity, reference_id, via_fallback } => {
                    let suffix = if via_fallback { " [fallback]" } else { "" };
                    println!("verified against {reference_id} (similarity {similarity:.3}){suffix}");
                }
                VerificationOutcome::NotVerified { best_similarity, .. } => {
                    println!("not verified (best similarity {best_similarity:.3})");
                    std::process::exit(1);
                }
                VerificationOutcome::NoFaceDetected => {
                    println!("no face detected");
                    std::process::exit(1);
                }
                VerificationOutcome::NoReferences => {
                    println!("no active references for {user}");
                    std::process::exit(1);
                }
                VerificationOutcome::InputInvalid { reason } => {
                    println!("invalid image: {reason}");
                    std::process::exit(1);
                }
                VerificationOutcome::BackendUnavailable => {
                    println!("backend unavailable and no fallback-comparable references");
                    std::process::exit(1);
                }
            }
        }
        Commands::Detect { image } => {
            let encoded = load_image(&image)?;
            match verifier.detect_presence(&encoded) {
                PresenceOutcome::FacePresent => println!("face present"),
                PresenceOutcome::NoFaceDetected => {
                    println!("no face detected");
                    std::process::exit(1);
                }
                PresenceOutcome::InputInvalid { reason } => {
                    println!("invalid image: {reason}");
                    std::process::exit(1);
                }
            }
        }
        Commands::List { user } => {
            let references = store.active_references(&user).await?;
            if references.is_empty() {
                println!("no active references for {user}");
            }
            for r in references {
                println!(
                    "{}  {}  {}  {}",
                    r.id,
                    r.representation.kind().as_str(),
                    r.model_label,
                    r.created_at.to_rfc3339()
                );
            }
        }
        Commands::Remove { user, id } => {
            if store.deactivate_reference(&user, &id).await? {
                store
                    .append_audit(
                        &user,
                        "face_reference_removed",
                        serde_json::json!({ "reference_id": id.clone(), "source": "cli" }),
                    )
                    .await?;
                println!("removed {id}");
            } else {
                println!("no such reference: {id}");
                std::process::exit(1);
            }
        }
        Commands::Log { user, limit } => {
            let entries = store.recent_audit(&user, limit).await?;
            if entries.is_empty() {
                println!("no audit entries for {user}");
            }
            for e in entries {
                println!("{}  {}  {}", e.timestamp.to_rfc3339(), e.action, e.details);
            }
        }
        Commands::Status => {
            let active = store.count_active_references().await?;
            println!("database: {}", db_path.display());
            println!("backend:  {}", verifier.backend_label());
            println!("active references: {active}");
        }
    }

    Ok(())
}
