use chrono::{Duration, Utc};
use clap::Args;
use lead_exchange::config::MarketplaceConfig;
use lead_exchange::error::AppError;
use lead_exchange::marketplace::{
    cost, export_transactions_csv, BudgetBracket, HomeownerId, InMemoryMarketplaceStore, Lead,
    LineItemInput, Marketplace, NewLead, PricingInput, ProfessionalId, ProfessionalIdentity,
    PurchaseConfirmation, QuoteSubmission, QuoteTimeline, RecordingNotifier, Urgency,
};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

type DemoMarketplace = Marketplace<InMemoryMarketplaceStore, RecordingNotifier>;

const BRACKETS: [BudgetBracket; 7] = [
    BudgetBracket::Under3k,
    BudgetBracket::From3kTo10k,
    BudgetBracket::From10kTo25k,
    BudgetBracket::From25kTo50k,
    BudgetBracket::From50kTo100k,
    BudgetBracket::From100kTo250k,
    BudgetBracket::Over250k,
];

const URGENCIES: [Urgency; 4] = [
    Urgency::Emergency,
    Urgency::Urgent,
    Urgency::Flexible,
    Urgency::Planning,
];

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Slots offered on the demo lead.
    #[arg(long, default_value_t = 2)]
    pub(crate) max_claims: u32,
    /// Budget bracket of the demo lead (for example 3k_10k).
    #[arg(long, value_parser = crate::infra::parse_bracket)]
    pub(crate) bracket: Option<BudgetBracket>,
    /// Urgency of the demo lead (emergency, urgent, flexible, planning).
    #[arg(long, value_parser = crate::infra::parse_urgency)]
    pub(crate) urgency: Option<Urgency>,
    /// Write every demo ledger entry as CSV to this path.
    #[arg(long)]
    pub(crate) export: Option<PathBuf>,
    /// Print the ledger CSV to stdout when no export path is given.
    #[arg(long)]
    pub(crate) print_ledger: bool,
    /// Skip the quote and acceptance portion of the demo.
    #[arg(long)]
    pub(crate) skip_quotes: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PricingTableArgs {
    /// Apply the verified professional discount.
    #[arg(long)]
    pub(crate) verified: bool,
}

pub(crate) fn run_pricing_table(args: PricingTableArgs) {
    println!(
        "Claim cost in credits ({})",
        if args.verified {
            "verified professional"
        } else {
            "standard professional"
        }
    );

    let mut header = format!("{:<12}", "bracket");
    for urgency in URGENCIES {
        header.push_str(&format!("{:>11}", urgency.label()));
    }
    println!("{header}");

    for bracket in BRACKETS {
        let mut row = format!("{:<12}", bracket.label());
        for urgency in URGENCIES {
            row.push_str(&format!(
                "{:>11}",
                cost::cost(bracket, urgency, args.verified)
            ));
        }
        println!("{row}");
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        max_claims,
        bracket,
        urgency,
        export,
        print_ledger,
        skip_quotes,
    } = args;
    let bracket = bracket.unwrap_or(BudgetBracket::From3kTo10k);
    let urgency = urgency.unwrap_or(Urgency::Flexible);

    let notifier = Arc::new(RecordingNotifier::default());
    let marketplace = Marketplace::new(
        Arc::new(InMemoryMarketplaceStore::default()),
        notifier.clone(),
        MarketplaceConfig::default(),
    );

    println!("Lead exchange demo");
    let mut cast = Vec::new();
    for (name, credits) in [("alder", 10), ("birch", 3), ("cedar", 5), ("dogwood", 100)] {
        let pro = ProfessionalIdentity {
            id: ProfessionalId(format!("pro-{name}")),
            verified: false,
        };
        marketplace.grant_free_credits(&pro.id, credits, "demo welcome credits")?;
        println!("- {} starts with {} credits", pro.id, credits);
        cast.push(pro);
    }

    let lead = match marketplace.post_lead(demo_lead(bracket, urgency, max_claims)) {
        Ok(lead) => lead,
        Err(err) => {
            println!("  Lead rejected: {}", err);
            return Ok(());
        }
    };
    println!(
        "\nPosted {} ({}, {}) with {} slots at {} credits per claim",
        lead.id,
        bracket.label(),
        urgency.label(),
        lead.max_claims,
        cost::cost(bracket, urgency, false)
    );

    println!("\nClaims");
    let claimants = claim_in_turn(&marketplace, &lead, &cast);

    let purchase = marketplace.record_purchase(PurchaseConfirmation {
        professional_id: cast[1].id.clone(),
        package_id: "starter".to_string(),
        credits_amount: 10,
        bonus_credits: 0,
        payment_reference: "demo-checkout-1".to_string(),
        confirmed_at: None,
    })?;
    println!(
        "\n{} buys a starter pack: +{} credits (balance {})",
        cast[1].id, purchase.credited, purchase.new_balance
    );

    if !skip_quotes && !claimants.is_empty() {
        run_quote_round(&marketplace, &lead, &claimants);
    }

    run_cancellation(&marketplace, &cast[3]);

    let sweep = marketplace.sweep(Utc::now() + Duration::days(8));
    match sweep {
        Ok(report) => println!(
            "\nSweep one week out: {} leads expired, {} quotes expired, {} credits lapsed",
            report.leads_expired, report.quotes_expired, report.credits_expired
        ),
        Err(err) => println!("\nSweep unavailable: {}", err),
    }

    println!("\nBalances");
    for pro in &cast {
        let view = marketplace.balance(&pro.id)?;
        let report = marketplace.reconcile(&pro.id)?;
        println!(
            "- {}: {} credits ({} free, {} paid) | earned {} spent {} refunded {} | {} entries reconciled",
            pro.id,
            view.total_credits,
            view.free_credits,
            view.paid_credits,
            view.lifetime_earned,
            view.lifetime_spent,
            view.lifetime_refunded,
            report.transaction_count
        );
    }

    let events = notifier.events();
    if events.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications");
        for event in events {
            println!("- {}", event.name());
        }
    }

    let mut ledger = Vec::new();
    for pro in &cast {
        ledger.extend(marketplace.transactions(&pro.id)?);
    }
    ledger.sort_by_key(|entry| entry.created_at);

    match export {
        Some(path) => {
            let rows = export_transactions_csv(&ledger, File::create(&path)?)?;
            println!("\nWrote {} ledger entries to {}", rows, path.display());
        }
        None if print_ledger => {
            println!();
            export_transactions_csv(&ledger, io::stdout().lock())?;
        }
        None => {}
    }

    Ok(())
}

fn demo_lead(bracket: BudgetBracket, urgency: Urgency, max_claims: u32) -> NewLead {
    NewLead {
        homeowner_id: HomeownerId("home-demo".to_string()),
        category: "roofing".to_string(),
        description: "Replace storm damaged ridge tiles".to_string(),
        budget_bracket: bracket,
        urgency,
        max_claims: Some(max_claims),
        expires_at: Utc::now() + Duration::days(7),
        direct_professional_id: None,
    }
}

fn claim_in_turn(
    marketplace: &DemoMarketplace,
    lead: &Lead,
    cast: &[ProfessionalIdentity],
) -> Vec<ProfessionalIdentity> {
    let mut claimants = Vec::new();
    for pro in cast {
        match marketplace.claim_lead(&lead.id, pro) {
            Ok(receipt) => {
                println!(
                    "- {} claimed {} for {} credits ({} left)",
                    pro.id, lead.id, receipt.claim.credits_spent, receipt.remaining_credits
                );
                claimants.push(pro.clone());
            }
            Err(err) => println!("- {} rejected: {}", pro.id, err),
        }
    }
    claimants
}

fn run_quote_round(marketplace: &DemoMarketplace, lead: &Lead, claimants: &[ProfessionalIdentity]) {
    println!("\nQuotes");
    let start = Utc::now().date_naive() + Duration::days(14);
    let mut quote_ids = Vec::new();
    for (offset, pro) in (0u64..).zip(claimants) {
        let submission = QuoteSubmission {
            pricing: PricingInput {
                items: vec![
                    LineItemInput {
                        category: "labour".to_string(),
                        quantity: 3,
                        unit_price: 45_000 - offset * 2_500,
                    },
                    LineItemInput {
                        category: "materials".to_string(),
                        quantity: 1,
                        unit_price: 38_000,
                    },
                ],
            },
            timeline: QuoteTimeline {
                estimated_start_date: start,
                estimated_completion_date: start + Duration::days(3),
            },
        };
        match marketplace.submit_quote(&lead.id, &pro.id, submission) {
            Ok(quote) => {
                println!(
                    "- {} quoted {} subtotal + {} VAT = {} (minor units)",
                    pro.id, quote.pricing.subtotal, quote.pricing.vat, quote.pricing.total
                );
                quote_ids.push(quote.id);
            }
            Err(err) => println!("- {} could not quote: {}", pro.id, err),
        }
    }

    let Some(chosen) = quote_ids.first() else {
        return;
    };
    match marketplace.accept_quote(chosen) {
        Ok(quote) => println!("- homeowner accepted {} from {}", quote.id, quote.professional_id),
        Err(err) => {
            println!("- acceptance failed: {}", err);
            return;
        }
    }
    for quote_id in quote_ids.iter().skip(1) {
        if let Ok(quote) = marketplace.quote(quote_id) {
            println!(
                "- {} is now {:?} ({})",
                quote.id,
                quote.status,
                quote.decline_reason.as_deref().unwrap_or("no reason recorded")
            );
        }
    }
}

fn run_cancellation(marketplace: &DemoMarketplace, pro: &ProfessionalIdentity) {
    println!("\nCancellation");
    let lead = match marketplace.post_lead(demo_lead(BudgetBracket::Under3k, Urgency::Urgent, 3)) {
        Ok(lead) => lead,
        Err(err) => {
            println!("- lead rejected: {}", err);
            return;
        }
    };
    if let Err(err) = marketplace.claim_lead(&lead.id, pro) {
        println!("- {} could not claim {}: {}", pro.id, lead.id, err);
        return;
    }
    match marketplace.cancel_lead(&lead.id, "homeowner found a neighbour to help") {
        Ok(outcome) => println!(
            "- {} cancelled: {} claims refunded for {} credits",
            outcome.lead.id, outcome.refunded_claims, outcome.credits_refunded
        ),
        Err(err) => println!("- cancellation failed: {}", err),
    }
}
