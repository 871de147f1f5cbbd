use crate::infra::StorageHandles;
use clap::Args;
use scheme_intake::error::AppError;
use scheme_intake::intake::{
    field_key, is_rd_number_item, ApplicationId, ApplicationStatus, CheckOutcome, Consent,
    DiscoveryMode, DiscoveryRequest, DraftView, IntakeError, IntakeService, Prompt, RetryPolicy,
    StartRequest, VerificationPolicy,
};
use scheme_intake::storage::seed::{seed_profiles, seed_schemes};
use std::io::Cursor;
use std::path::PathBuf;

const SAMPLE_SCHEMES: &str = include_str!("../../../data/sample_schemes.csv");
const SAMPLE_PROFILES: &str = include_str!("../../../data/sample_profiles.csv");
const SAMPLE_OTP: &str = "482913";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Aadhaar number of the sample citizen to walk through
    #[arg(long, default_value = "123456789012")]
    pub(crate) national_id: String,
    /// Scheme to apply for once discovery completes
    #[arg(long, default_value = "Gruha Lakshmi")]
    pub(crate) scheme: String,
    /// Directory for the rendered application (defaults to a temp directory)
    #[arg(long)]
    pub(crate) output_dir: Option<PathBuf>,
    /// Stop after discovery and eligibility explanations
    #[arg(long)]
    pub(crate) skip_application: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        national_id,
        scheme,
        output_dir,
        skip_application,
    } = args;

    let output_dir =
        output_dir.unwrap_or_else(|| std::env::temp_dir().join("scheme-intake-demo"));
    let handles = StorageHandles::in_memory(&output_dir)?;
    seed_schemes(&handles.catalog, Cursor::new(SAMPLE_SCHEMES))?;
    seed_profiles(&handles.profiles, Cursor::new(SAMPLE_PROFILES))?;
    let service = handles.intake_service(VerificationPolicy::default(), RetryPolicy::default());

    println!("Scheme intake demo");
    let catalog = service.list_schemes()?;
    println!("\nCatalog ({} schemes)", catalog.len());
    for entry in &catalog {
        println!(
            "- {} [{}] fee {} | {}",
            entry.name, entry.department, entry.application_fee, entry.eligibility_summary
        );
    }

    let consent = Consent::granted(SAMPLE_OTP);
    let discovery = service.discover(&DiscoveryRequest {
        national_id: Some(national_id.clone()),
        consent: consent.clone(),
        profile_json: None,
    })?;
    println!(
        "\nDiscovery for XXXXXXXX{} ({:?})",
        national_id.get(8..).unwrap_or_default(),
        discovery.mode
    );
    if let Some(notice) = &discovery.notice {
        println!("  {notice}");
    }
    for entry in &discovery.schemes {
        println!("- eligible: {}", entry.name);
    }

    if discovery.mode == DiscoveryMode::Personalized {
        println!("\nWhy the others were filtered out");
        let filtered = catalog
            .iter()
            .filter(|entry| !discovery.schemes.iter().any(|kept| kept.id == entry.id));
        for entry in filtered {
            let checks = service.explain_eligibility(&national_id, &consent, &entry.name)?;
            let failed: Vec<String> = checks
                .iter()
                .filter(|check| check.outcome == CheckOutcome::Failed)
                .map(|check| check.notes.clone())
                .collect();
            println!("- {}: {}", entry.name, failed.join("; "));
        }
    }

    if skip_application {
        return Ok(());
    }

    println!("\nApplication for {scheme}");
    let mut view = service.start_application(&StartRequest {
        national_id,
        scheme_name: scheme,
        consent,
    })?;
    print_checklist(&view);

    let draft_id = view.draft_id.clone();
    let mut rd_mismatch_shown = false;
    while let Some(prompt) = view.next_prompt.clone() {
        view = match prompt {
            Prompt::Information { item } => {
                if !rd_mismatch_shown && is_rd_number_item(&item) {
                    rd_mismatch_shown = true;
                    match service.submit_item(&draft_id, &item, "RD000000") {
                        Err(err) => println!("  {item}: rejected ({err})"),
                        Ok(_) => println!("  {item}: accepted without profile check"),
                    }
                    service.draft(&draft_id)?
                } else {
                    let answer = sample_answer(&item);
                    println!("  {item}: {answer}");
                    service.submit_item(&draft_id, &item, &answer)?
                }
            }
            Prompt::Document { document } => {
                println!("  received document: {document}");
                service.mark_document(&draft_id, &document)?
            }
            Prompt::Confirmation => break,
        };
    }

    let receipt = service.confirm(&draft_id)?;
    println!(
        "\nSubmitted application {} -> {}",
        receipt.application_id, receipt.status
    );
    match receipt.download_path() {
        Some(path) => println!("  Download: {path} (file in {})", output_dir.display()),
        None => println!("  Rendering failed; the submission is still recorded"),
    }

    let updated = handles
        .applications
        .set_status(&receipt.application_id, ApplicationStatus::UnderReview)
        .map_err(IntakeError::from)?;
    print_status(&service, &updated.application_id)?;
    Ok(())
}

fn print_checklist(view: &DraftView) {
    println!("Required information");
    for item in &view.items {
        match &item.value {
            Some(value) => println!(
                "- {}: {} ({})",
                item.name,
                value.value,
                value.provenance.label()
            ),
            None => println!("- {}: pending", item.name),
        }
    }
    if let Some(notice) = &view.notice {
        println!("  {notice}");
    }
}

fn print_status(service: &IntakeService, id: &ApplicationId) -> Result<(), AppError> {
    let view = service.application_status(&id.0)?;
    match serde_json::to_string_pretty(&view) {
        Ok(json) => println!("  Public status payload:\n{json}"),
        Err(err) => println!("  Public status payload unavailable: {err}"),
    }
    Ok(())
}

fn sample_answer(item: &str) -> String {
    match field_key(item).as_str() {
        "phone" => "9876543210".to_string(),
        "caste_certificate_rd_number" => "CC123".to_string(),
        "occupation" => "Tailor".to_string(),
        "land_survey_number" => "MND-114/2".to_string(),
        _ => format!("sample {}", item.to_ascii_lowercase()),
    }
}
