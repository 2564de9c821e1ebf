use std::path::Path;

use leadscore::dataset::{LABEL_COLUMN, LeadFrame, LeadRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const INDUSTRIES: [&str; 5] = ["logistics", "manufacturing", "retail", "technology", "finance"];
pub const LEAD_SOURCES: [&str; 5] = ["web", "referral", "trade_show", "cold_call", "email"];

/// Synthetic leads whose conversion odds favor technology and referrals.
pub fn synthetic_leads(n: usize, seed: u64) -> (LeadFrame, Vec<bool>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let industry = INDUSTRIES[rng.random_range(0..INDUSTRIES.len())];
        let lead_source = LEAD_SOURCES[rng.random_range(0..LEAD_SOURCES.len())];
        let company_size = rng.random_range(10..10_000) as f64;
        let annual_revenue = rng.random_range(100_000..5_000_000) as f64;
        let num_employees = (company_size * rng.random_range(0.7..1.3)).round().max(1.0);
        let past_interactions = poisson(&mut rng, 2.0) as f64;

        let mut prob = match industry {
            "technology" => 0.6,
            "logistics" => 0.4,
            _ => 0.3,
        };
        if lead_source == "referral" {
            prob += 0.1;
        }
        prob += 0.05 * past_interactions;
        prob += 1e-7 * annual_revenue;
        prob = (prob + rng.random_range(-0.1..0.1)).clamp(0.0, 1.0);

        rows.push(LeadRecord {
            company_name: Some(format!("Company {i}")),
            company_size: Some(company_size),
            annual_revenue: Some(annual_revenue),
            num_employees: Some(num_employees),
            industry: Some(industry.to_string()),
            lead_source: Some(lead_source.to_string()),
            past_interactions: Some(past_interactions),
        });
        labels.push(rng.random::<f64>() < prob);
    }
    (LeadFrame::from_records(rows), labels)
}

/// The technology referral lead every trained model should accept.
pub fn concrete_lead() -> LeadRecord {
    LeadRecord {
        company_name: Some("Acme Robotics".into()),
        company_size: Some(500.0),
        annual_revenue: Some(2_000_000.0),
        num_employees: Some(480.0),
        industry: Some("technology".into()),
        lead_source: Some("referral".into()),
        past_interactions: Some(3.0),
    }
}

/// Write synthetic leads as CSV, optionally without the label column.
pub fn write_csv(path: &Path, n: usize, seed: u64, with_label: bool) {
    let (frame, labels) = synthetic_leads(n, seed);
    let mut writer = csv::Writer::from_path(path).expect("create csv");
    let mut header = vec![
        "company_name",
        "industry",
        "company_size",
        "annual_revenue",
        "num_employees",
        "lead_source",
        "past_interactions",
    ];
    if with_label {
        header.push(LABEL_COLUMN);
    }
    writer.write_record(&header).expect("write header");
    for (row, label) in frame.rows().iter().zip(labels) {
        let mut record = vec![
            row.company_name.clone().unwrap_or_default(),
            row.industry.clone().unwrap_or_default(),
            fmt_num(row.company_size),
            fmt_num(row.annual_revenue),
            fmt_num(row.num_employees),
            row.lead_source.clone().unwrap_or_default(),
            fmt_num(row.past_interactions),
        ];
        if with_label {
            record.push(if label { "1" } else { "0" }.to_string());
        }
        writer.write_record(&record).expect("write row");
    }
    writer.flush().expect("flush csv");
}

fn fmt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn poisson(rng: &mut StdRng, lambda: f64) -> u32 {
    let limit = (-lambda).exp();
    let mut k = 0u32;
    let mut p = 1.0f64;
    loop {
        p *= rng.random::<f64>();
        if p <= limit {
            return k;
        }
        k += 1;
    }
}
