use crate::infra::{
    InMemoryAuditLog, InMemoryJobStore, InMemoryObjectRegistry, InMemoryPricebookStore,
};
use chrono::{Duration, NaiveDate, Utc};
use clap::Args;
use glassline::config::UploadConfig;
use glassline::error::AppError;
use glassline::workflows::jobs::{
    HookEvent, HookRequest, JobId, JobRecord, JobRepository, UploadDescriptor, UploadLifecycle,
};
use glassline::workflows::pricing::{
    CreateVersionRequest, Formula, LineItem, OverrideRequest, PriceJobRequest, PricingService,
    QuotePricing, RuleCategory, RuleSpec,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Sales tax amount applied to the demo quote.
    #[arg(long, default_value_t = 7.0)]
    pub(crate) tax: f64,
    /// Skip the manual override portion of the demo.
    #[arg(long)]
    pub(crate) skip_override: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Quote pipeline demo");

    let jobs = Arc::new(InMemoryJobStore::default());
    let objects = Arc::new(InMemoryObjectRegistry::default());
    let pricebooks = Arc::new(InMemoryPricebookStore::default());
    let audit = Arc::new(InMemoryAuditLog::default());

    let upload_config = UploadConfig {
        bucket: "scan-intake".to_string(),
        object_ttl_days: 30,
    };
    let lifecycle = UploadLifecycle::new(jobs.clone(), objects, &upload_config);
    let pricing = PricingService::new(pricebooks, jobs.clone(), audit.clone());

    let job_id = JobId("job-000001".to_string());
    let token = "tok-demo".to_string();
    if let Err(err) = jobs.insert(JobRecord::created(
        job_id.clone(),
        token.clone(),
        Utc::now() + Duration::minutes(15),
    )) {
        println!("  Job intake failed: {err}");
        return Ok(());
    }
    println!("- Created {job_id} awaiting a drawing upload");

    println!("\nUpload gateway callbacks");
    for (hook_type, upload) in [
        ("pre-create", bare_upload(&token)),
        ("post-finish", finished_upload(&token)),
    ] {
        let request = HookRequest {
            hook_type: Some(hook_type.to_string()),
            event: HookEvent { upload },
        };
        match lifecycle.dispatch(&request) {
            Ok(outcome) => println!("- {hook_type}: {outcome:?}"),
            Err(err) => {
                println!("- {hook_type} rejected: {err}");
                return Ok(());
            }
        }
    }
    if let Ok(Some(record)) = jobs.fetch(&job_id) {
        println!("- Job status now {}", record.status.label());
    }

    println!("\nMeasurement stage (simulated external worker)");
    if let Err(err) = seed_measurement(&jobs, &job_id, args.tax) {
        println!("  Measurement write failed: {err}");
        return Ok(());
    }
    println!("- Extracted 2 line items from the scanned drawing");

    println!("\nPricing");
    let version = match pricing.create_version(CreateVersionRequest {
        effective_date: demo_effective_date(),
        notes: "demo pricebook".to_string(),
        clone_from: None,
        actor: Some("demo".to_string()),
    }) {
        Ok(version) => version,
        Err(err) => {
            println!("  Pricebook creation failed: {err}");
            return Ok(());
        }
    };
    for spec in demo_rules() {
        if let Err(err) = pricing.create_rule(&version.id, spec) {
            println!("  Rule creation failed: {err}");
            return Ok(());
        }
    }
    println!(
        "- Pricebook {} v{} loaded with {} rules",
        version.id,
        version.version,
        demo_rules().len()
    );

    let quote = match pricing.price_job(
        &job_id,
        PriceJobRequest {
            version_id: version.id,
            actor: Some("demo".to_string()),
        },
    ) {
        Ok(quote) => quote,
        Err(err) => {
            println!("  Pricing failed: {err}");
            return Ok(());
        }
    };
    render_quote(&quote);

    if !args.skip_override {
        println!("\nManual override (field measurement correction)");
        match pricing.apply_override(
            &job_id,
            "LI-1",
            OverrideRequest {
                unit_price: 425.0,
                reason: "matched a competing written estimate".to_string(),
                actor: Some("estimator".to_string()),
            },
        ) {
            Ok(item) => println!(
                "- {} now {:.2} ({})",
                item.item_id,
                item.unit_price,
                item.override_reason.as_deref().unwrap_or("no reason")
            ),
            Err(err) => {
                println!("  Override rejected: {err}");
                return Ok(());
            }
        }
        if let Ok(Some(record)) = jobs.fetch(&job_id) {
            if let Some(pricing) = record.document.pricing {
                render_quote(&pricing);
            }
        }
    }

    println!("\nAudit trail");
    for entry in audit.entries() {
        println!(
            "- {} by {} {}",
            entry.action.label(),
            entry.actor,
            entry
                .job_id
                .map(|id| format!("on {id}"))
                .unwrap_or_default()
        );
    }

    Ok(())
}

fn demo_effective_date() -> NaiveDate {
    Utc::now().date_naive()
}

fn bare_upload(token: &str) -> UploadDescriptor {
    UploadDescriptor {
        id: String::new(),
        size: 0,
        meta_data: BTreeMap::from([("token".to_string(), token.to_string())]),
        storage: BTreeMap::new(),
    }
}

fn finished_upload(token: &str) -> UploadDescriptor {
    UploadDescriptor {
        id: "demo-upload+multipart-1".to_string(),
        size: 48_213,
        meta_data: BTreeMap::from([
            ("token".to_string(), token.to_string()),
            ("filetype".to_string(), "application/pdf".to_string()),
        ]),
        storage: BTreeMap::from([
            ("Bucket".to_string(), "scan-intake".to_string()),
            ("Key".to_string(), "demo-upload".to_string()),
        ]),
    }
}

fn seed_measurement(
    jobs: &InMemoryJobStore,
    job_id: &JobId,
    tax: f64,
) -> Result<(), glassline::workflows::jobs::RepositoryError> {
    let record = jobs.fetch(job_id)?.ok_or_else(|| {
        glassline::workflows::jobs::RepositoryError::NotFound
    })?;
    let mut document = record.document;
    document.measurement = Some(json!({
        "pages": 1,
        "units": "inches",
        "panels": [{ "width": 30.0, "height": 48.0 }],
    }));
    document.pricing = Some(QuotePricing {
        line_items: vec![
            LineItem {
                item_id: "LI-1".to_string(),
                category: RuleCategory::ShowerEnclosure,
                quantity: 1,
                attributes: BTreeMap::from([(
                    "glassType".to_string(),
                    "clear".to_string(),
                )]),
                area_sqft: Some(10.0),
                unit_price: 0.0,
                total_price: 0.0,
                manual_override: false,
                override_reason: None,
            },
            LineItem {
                item_id: "LI-2".to_string(),
                category: RuleCategory::Hardware,
                quantity: 4,
                attributes: BTreeMap::new(),
                area_sqft: None,
                unit_price: 0.0,
                total_price: 0.0,
                manual_override: false,
                override_reason: None,
            },
        ],
        subtotal: 0.0,
        tax,
        total: 0.0,
    });
    jobs.replace_document(job_id, document)
}

fn demo_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec {
            name: "Clear shower glass".to_string(),
            category: RuleCategory::ShowerEnclosure,
            formula: Formula::PerSqft { rate: 45.0 },
            applies_to: BTreeMap::from([("glassType".to_string(), "clear".to_string())]),
            is_active: true,
            actor: Some("demo".to_string()),
        },
        RuleSpec {
            name: "Standard hinge set".to_string(),
            category: RuleCategory::Hardware,
            formula: Formula::UnitPrice { unit_price: 12.5 },
            applies_to: BTreeMap::from([("category".to_string(), "HARDWARE".to_string())]),
            is_active: true,
            actor: Some("demo".to_string()),
        },
    ]
}

fn render_quote(quote: &QuotePricing) {
    println!("- Quote:");
    for item in &quote.line_items {
        let flag = if item.manual_override { " [manual]" } else { "" };
        println!(
            "    {} x{} @ {:.2} = {:.2}{}",
            item.item_id, item.quantity, item.unit_price, item.total_price, flag
        );
    }
    println!(
        "    subtotal {:.2} + tax {:.2} = total {:.2}",
        quote.subtotal, quote.tax, quote.total
    );
}
