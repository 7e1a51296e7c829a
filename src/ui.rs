use crate::format::{format_inr, format_percent};
use crate::models::{
    CollectionRate, PacingDirection, PartnerDefinition, PartnerSummary, Snapshot, TargetStatus,
};
use chrono::{DateTime, FixedOffset};
use std::fmt::Write;

pub struct DashboardView<'a> {
    pub now: DateTime<FixedOffset>,
    pub partners: &'a [PartnerDefinition],
    pub snapshot: &'a Snapshot,
    pub month_end_projection: Option<f64>,
}

pub fn render_login(error: Option<&str>) -> String {
    let error_html = error
        .map(|message| format!(r#"<p class="error">{}</p>"#, escape_html(message)))
        .unwrap_or_default();
    LOGIN_HTML
        .replace("{{STYLE}}", BASE_STYLE)
        .replace("{{ERROR}}", &error_html)
}

pub fn render_dashboard(view: &DashboardView<'_>) -> String {
    let snapshot = view.snapshot;

    let projection = view
        .month_end_projection
        .map(|amount| {
            format!(
                r#"<div class="projection">⭐ Month-End Projection: <strong>{}</strong></div>"#,
                format_inr(amount)
            )
        })
        .unwrap_or_default();

    let mut cards = String::new();
    for (partner, summary) in view.partners.iter().zip(&snapshot.per_partner) {
        cards.push_str(&partner_card(partner, summary));
    }

    DASHBOARD_HTML
        .replace("{{STYLE}}", BASE_STYLE)
        .replace("{{PROJECTION}}", &projection)
        .replace("{{DATE}}", &view.now.format("%d %B %Y").to_string())
        .replace("{{DAYS_LEFT}}", &snapshot.days_left.to_string())
        .replace("{{SUMMARY}}", &summary_cards(snapshot))
        .replace("{{CARDS}}", &cards)
}

fn summary_cards(snapshot: &Snapshot) -> String {
    let (shortfall_arrow, shortfall_class) = match snapshot.pacing_direction {
        PacingDirection::Behind => ("↓", "down"),
        PacingDirection::Ahead => ("↑", "up"),
    };
    let (growth_arrow, growth_class) = if snapshot.mom_growth >= 0.0 {
        ("↑", "up")
    } else {
        ("↓", "down")
    };

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<section class="summary">
  <article class="summary-card">
    <h2>🌍 Monthly Goal Status</h2>
    <p><span>MTD Disbursement</span><strong>{mtd}</strong></p>
    <p><span>Monthly Target</span><strong>{target}</strong></p>
    <p><span>Achieved</span><strong>{progress}</strong></p>
  </article>
  <article class="summary-card">
    <h2>📈 Monthly Shortfall</h2>
    <p><span>MTD Target</span><strong>{pacing}</strong></p>
    <p><span>Shortfall</span><strong>{shortfall}</strong></p>
    <p class="{shortfall_class}">{shortfall_arrow} {shortfall_pct}</p>
  </article>
  <article class="summary-card">
    <h2>🏆 MoM Growth</h2>
    <p><span>PMTD Disbursement</span><strong>{prior}</strong></p>
    <p><span>Growth</span><strong>{growth}</strong></p>
    <p class="{growth_class}">{growth_arrow} {growth_pct}</p>
  </article>
</section>"#,
        mtd = format_inr(snapshot.total_current),
        target = format_inr(snapshot.total_target),
        progress = format_percent(snapshot.goal_progress_pct),
        pacing = format_inr(snapshot.pacing_target),
        shortfall = format_inr(snapshot.pacing_shortfall.abs()),
        shortfall_pct = format_percent(snapshot.pacing_shortfall_pct),
        prior = format_inr(snapshot.total_prior),
        growth = format_inr(snapshot.mom_growth.abs()),
        growth_pct = format_percent(snapshot.mom_growth_pct.abs()),
    );
    html
}

fn partner_card(partner: &PartnerDefinition, summary: &PartnerSummary) -> String {
    let name = escape_html(&partner.name);
    let title = match partner.url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => format!(
            r#"<a href="{}" target="_blank" rel="noopener">{name}</a>"#,
            escape_html(url)
        ),
        None => name,
    };
    let current = amount_or_coming_soon(summary.current);
    let prior = amount_or_coming_soon(summary.prior);
    let collection = match summary.collection_rate {
        CollectionRate::Known(rate) => format_percent(rate),
        CollectionRate::Unavailable => "N/A".to_string(),
    };
    let remaining = match summary.target_status {
        TargetStatus::Achieved => "Target Achieved! 🎉".to_string(),
        TargetStatus::Remaining {
            amount,
            pct_of_target,
        } => format!("{} ({pct_of_target:.0}%)", format_inr(amount)),
        TargetStatus::NotTracked => "N/A".to_string(),
    };

    format!(
        r#"<article class="brand-card card-{color}">
  <header><span class="owner">{owner}</span><span class="icon">{icon}</span></header>
  <h3>{title}</h3>
  <p class="target">Target: {target}</p>
  <dl>
    <dt>MTD Disb</dt><dd>{current}</dd>
    <dt>PMTD Disb</dt><dd>{prior}</dd>
    <dt>Collection</dt><dd>{collection}</dd>
    <dt>Yet to Achieve</dt><dd>{remaining}</dd>
  </dl>
</article>
"#,
        color = escape_html(&partner.color),
        owner = escape_html(&partner.owner),
        icon = escape_html(&partner.icon),
        target = format_inr(partner.target_amount),
    )
}

fn amount_or_coming_soon(amount: Option<f64>) -> String {
    amount
        .map(format_inr)
        .unwrap_or_else(|| "Coming Soon".to_string())
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const BASE_STYLE: &str = r#"
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg: #0f172a;
      --ink: #f8fafc;
      --muted: #94a3b8;
      --card: rgba(30, 41, 59, 0.9);
      --up: #22c55e;
      --down: #f87171;
      --shadow: 0 8px 32px rgba(0, 0, 0, 0.2);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: linear-gradient(135deg, #0f172a, #1e293b 60%, #0f172a 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      padding: 32px 24px 48px;
    }

    h1, h2, h3 {
      font-family: "Fraunces", "Georgia", serif;
      margin: 0;
    }

    a {
      color: inherit;
      text-decoration: none;
    }

    .error {
      color: var(--down);
    }

    .up {
      color: var(--up);
    }

    .down {
      color: var(--down);
    }
"#;

const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Performance Console</title>
  <style>{{STYLE}}
    .login {
      width: min(420px, 100%);
      margin: 12vh auto 0;
      background: var(--card);
      border-radius: 24px;
      box-shadow: var(--shadow);
      padding: 32px;
      display: grid;
      gap: 16px;
    }

    input, button {
      font: inherit;
      padding: 12px 14px;
      border-radius: 12px;
      border: none;
    }

    button {
      background: #6366f1;
      color: white;
      cursor: pointer;
    }
  </style>
</head>
<body>
  <form class="login" method="post" action="/login">
    <h1>🔒 Performance Console</h1>
    <label for="password">Enter password to access dashboard:</label>
    <input id="password" name="password" type="password" autocomplete="current-password" autofocus />
    {{ERROR}}
    <button type="submit">Unlock</button>
  </form>
</body>
</html>
"#;

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Brand Dashboards</title>
  <style>{{STYLE}}
    .top {
      display: grid;
      grid-template-columns: 1fr auto 1fr;
      align-items: center;
      gap: 16px;
      margin-bottom: 32px;
    }

    .top h1 {
      text-align: center;
      font-size: clamp(2rem, 4vw, 3rem);
    }

    .meta {
      justify-self: end;
      text-align: right;
      color: var(--muted);
    }

    .summary {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(260px, 1fr));
      gap: 20px;
      margin-bottom: 32px;
    }

    .summary-card, .brand-card {
      background: var(--card);
      border-radius: 20px;
      box-shadow: var(--shadow);
      padding: 24px;
    }

    .summary-card p {
      display: flex;
      justify-content: space-between;
      margin: 12px 0 0;
    }

    .cards {
      display: grid;
      grid-template-columns: repeat(auto-fill, minmax(240px, 1fr));
      gap: 20px;
    }

    .brand-card header {
      display: flex;
      justify-content: space-between;
      color: var(--muted);
    }

    .brand-card dl {
      display: grid;
      grid-template-columns: auto 1fr;
      gap: 6px 12px;
      margin: 12px 0 0;
    }

    .brand-card dd {
      margin: 0;
      text-align: right;
    }

    .target {
      color: var(--muted);
    }

    .card-blue { border-top: 4px solid #3b82f6; }
    .card-green { border-top: 4px solid #22c55e; }
    .card-orange { border-top: 4px solid #f97316; }
    .card-teal { border-top: 4px solid #14b8a6; }
    .card-purple { border-top: 4px solid #a855f7; }
    .card-indigo { border-top: 4px solid #6366f1; }
    .card-red { border-top: 4px solid #ef4444; }
    .card-pink { border-top: 4px solid #ec4899; }

    @media (max-width: 768px) {
      .top {
        grid-template-columns: 1fr;
      }

      .meta {
        justify-self: center;
        text-align: center;
      }
    }
  </style>
</head>
<body>
  <header class="top">
    <div>{{PROJECTION}}</div>
    <h1>Performance Console</h1>
    <div class="meta">
      <div>📅 {{DATE}}</div>
      <div>⏰ {{DAYS_LEFT}} days left in month</div>
    </div>
  </header>
  {{SUMMARY}}
  <section class="cards">
{{CARDS}}  </section>
</body>
</html>
"#;
