use crate::models::{
    PacingDirection, PartnerDefinition, PartnerFigures, PartnerSummary, Snapshot, TargetStatus,
};
use crate::pacing::{days_in_month, pacing_target};
use chrono::{Datelike, NaiveDate};

/// Folds resolved partner figures into the month-to-date snapshot for `today`.
///
/// `figures` is matched to `partners` by position.
pub fn build_snapshot(
    partners: &[PartnerDefinition],
    figures: &[PartnerFigures],
    today: NaiveDate,
) -> Snapshot {
    let per_partner: Vec<PartnerSummary> = partners
        .iter()
        .zip(figures)
        .map(|(partner, figures)| PartnerSummary {
            name: partner.name.clone(),
            target: partner.target_amount,
            current: figures.current,
            prior: figures.prior,
            collection_rate: figures.collection_rate,
            target_status: target_status(partner.target_amount, figures.current),
        })
        .collect();

    let total_current: f64 = per_partner.iter().filter_map(|p| p.current).sum();
    let total_prior: f64 = per_partner.iter().filter_map(|p| p.prior).sum();
    let total_target: f64 = partners.iter().map(|p| p.target_amount).sum();

    let mom_growth = total_current - total_prior;
    let mom_growth_pct = percent_of(mom_growth, total_prior);

    let day_of_month = today.day();
    let days_in_month = days_in_month(today);
    let pacing_target = pacing_target(total_target, day_of_month, days_in_month);
    let pacing_shortfall = pacing_target - total_current;
    let pacing_direction = if pacing_shortfall > 0.0 {
        PacingDirection::Behind
    } else {
        PacingDirection::Ahead
    };

    Snapshot {
        per_partner,
        total_current,
        total_prior,
        total_target,
        goal_progress_pct: percent_of(total_current, total_target),
        mom_growth,
        mom_growth_pct,
        pacing_target,
        pacing_shortfall,
        pacing_shortfall_pct: percent_of(pacing_shortfall.abs(), pacing_target),
        pacing_direction,
        day_of_month,
        days_in_month,
        days_left: days_in_month - day_of_month,
    }
}

pub fn target_status(target: f64, current: Option<f64>) -> TargetStatus {
    let Some(current) = current else {
        return TargetStatus::NotTracked;
    };
    let remaining = target - current;
    if remaining <= 0.0 {
        TargetStatus::Achieved
    } else {
        TargetStatus::Remaining {
            amount: remaining,
            pct_of_target: percent_of(remaining, target),
        }
    }
}

fn percent_of(value: f64, base: f64) -> f64 {
    if base > 0.0 { value / base * 100.0 } else { 0.0 }
}
