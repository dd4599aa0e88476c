use std::cmp::Ordering;

/// Compare two dotted version strings.
///
/// A leading `v` is ignored and missing components count as zero. A `-suffix`
/// marks a pre-release, which sorts below the same numeric version:
/// `dev < alpha < beta < rc`, unknown labels after `rc`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_core, a_pre) = parse(a);
    let (b_core, b_pre) = parse(b);

    a_core.cmp(&b_core).then_with(|| match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => prerelease_rank(a)
            .cmp(&prerelease_rank(b))
            .then_with(|| a.cmp(b)),
    })
}

pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}

fn parse(version: &str) -> ((u32, u32, u32), Option<&str>) {
    let version = version.trim().trim_start_matches('v');
    let (core, pre) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };
    let mut parts = core.split('.').map(|part| part.parse().unwrap_or(0));
    let triple = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    (triple, pre)
}

fn prerelease_rank(label: &str) -> u8 {
    let label = label.to_ascii_lowercase();
    if label.starts_with("dev") {
        0
    } else if label.starts_with("alpha") || label.starts_with('a') {
        1
    } else if label.starts_with("beta") || label.starts_with('b') {
        2
    } else if label.starts_with("rc") {
        3
    } else {
        4
    }
}
