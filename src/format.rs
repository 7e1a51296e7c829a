const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;

/// Renders a rupee amount the way the business reads it: crores and lakhs
/// above those thresholds, plain grouped rupees below.
pub fn format_inr(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let value = value.abs();
    if value >= CRORE {
        format!("{sign}₹{:.2} Cr", value / CRORE)
    } else if value >= LAKH {
        format!("{sign}₹{:.2} L", value / LAKH)
    } else {
        format!("{sign}₹{}", group_thousands(value.round() as u64))
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
