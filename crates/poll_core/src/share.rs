use shared::domain::{Candidate, Percentages, Tally};
use url::Url;

use crate::ballot::Ballot;

pub const DEFAULT_SHARE_TEMPLATE: &str =
    "I just voted! {a_label} {a_pct}% vs {b_label} {b_pct}% after {total} votes. Cast yours:";
pub const DEFAULT_COMPOSE_URL: &str = "https://warpcast.com/~/compose";

/// Fills `{a_label} {a_pct} {b_label} {b_pct} {total}` in `template` in a
/// single pass. Substituted values are never expanded again.
pub fn render_share_text(
    template: &str,
    ballot: &Ballot,
    tally: &Tally,
    percentages: &Percentages,
) -> String {
    let values = [
        ("{a_label}", ballot.label(Candidate::A).to_string()),
        ("{b_label}", ballot.label(Candidate::B).to_string()),
        ("{a_pct}", percentages.a.to_string()),
        ("{b_pct}", percentages.b.to_string()),
        ("{total}", tally.total().to_string()),
    ];

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Pre-filled compose link carrying the share text and, when known, the
/// frame itself as an embed.
pub fn share_url(compose_base: &str, text: &str, frame_url: Option<&str>) -> Option<Url> {
    let mut url = Url::parse(compose_base).ok()?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("text", text);
        if let Some(frame_url) = frame_url {
            query.append_pair("embeds[]", frame_url);
        }
    }
    Some(url)
}
