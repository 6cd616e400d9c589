//! Structural overlap between two templates.

use super::{Piece, Segment, UriTemplate, match_pieces};

pub(super) fn overlaps(a: &UriTemplate, b: &UriTemplate) -> bool {
    if a.scheme != b.scheme {
        return false;
    }
    let (sa, sb) = (&a.segments, &b.segments);
    let compared = match (a.has_wildcard(), b.has_wildcard()) {
        (false, false) => {
            if sa.len() != sb.len() {
                return false;
            }
            return sa.iter().zip(sb).all(|(x, y)| segments_overlap(x, y));
        }
        (true, false) if sb.len() < sa.len() => return false,
        (false, true) if sa.len() < sb.len() => return false,
        (true, false) => sa.len() - 1,
        (false, true) => sb.len() - 1,
        (true, true) => sa.len().min(sb.len()) - 1,
    };
    sa.iter()
        .zip(sb)
        .take(compared)
        .all(|(x, y)| segments_overlap(x, y))
        && edges_compatible(leading(&sa[compared]), leading(&sb[compared]), |l, r| l.starts_with(r))
}

fn segments_overlap(x: &Segment, y: &Segment) -> bool {
    match (x.literal(), y.literal()) {
        (Some(l), Some(r)) => l == r,
        (Some(lit), None) => match_pieces(&y.pieces, lit, &mut Vec::new()),
        (None, Some(lit)) => match_pieces(&x.pieces, lit, &mut Vec::new()),
        (None, None) => {
            edges_compatible(leading(x), leading(y), |l, r| l.starts_with(r))
                && edges_compatible(trailing(x), trailing(y), |l, r| l.ends_with(r))
        }
    }
}

fn edges_compatible(l: &str, r: &str, contains: fn(&str, &str) -> bool) -> bool {
    contains(l, r) || contains(r, l)
}

fn leading(segment: &Segment) -> &str {
    match segment.pieces.first() {
        Some(Piece::Literal(lit)) => lit,
        _ => "",
    }
}

fn trailing(segment: &Segment) -> &str {
    match segment.pieces.last() {
        Some(Piece::Literal(lit)) => lit,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(a: &str, b: &str) -> bool {
        let a = UriTemplate::parse(a).unwrap();
        let b = UriTemplate::parse(b).unwrap();
        assert_eq!(a.overlaps(&b), b.overlaps(&a), "overlap must be symmetric");
        a.overlaps(&b)
    }

    #[test]
    fn test_same_shape_overlaps() {
        assert!(check("a://{x}", "a://{y}"));
        assert!(check("a://{x}/c", "a://b/{y}"));
        assert!(check("a://{x}", "a://{y}{?q}"));
    }

    #[test]
    fn test_disjoint_literals() {
        assert!(!check("a://{x}/c", "a://{y}/d"));
        assert!(!check("a://{x}", "a://{x}/{y}"));
        assert!(!check("a://{x}", "b://{x}"));
        assert!(!check("a://v{x}", "a://w{x}"));
        assert!(!check("a://{x}.json", "a://{x}.xml"));
    }

    #[test]
    fn test_wildcards() {
        assert!(check("f://{p*}", "f://{x}/{y}"));
        assert!(check("f://docs/{p*}", "f://{p*}"));
        assert!(!check("f://docs/{p*}", "f://src/{p*}"));
        assert!(!check("f://a/b/{p*}", "f://{x}"));
    }
}
