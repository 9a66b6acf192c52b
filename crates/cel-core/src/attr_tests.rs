use crate::{Attribute, AttributePattern, PatternMatch, Qualifier, UnknownSet};

fn attr(s: &str) -> Attribute {
    s.parse().unwrap()
}

fn pattern(s: &str) -> AttributePattern {
    s.parse().unwrap()
}

#[test]
fn parse_plain_path() {
    let a = attr("request.auth.claims");
    assert_eq!(a.root(), "request");
    assert_eq!(
        a.qualifiers(),
        &[Qualifier::field("auth"), Qualifier::field("claims")]
    );
}

#[test]
fn parse_bracket_literals() {
    let a = attr("m[3][-1][2u][true]['key'].tail");
    assert_eq!(
        a.qualifiers(),
        &[
            Qualifier::Int(3),
            Qualifier::Int(-1),
            Qualifier::Uint(2),
            Qualifier::Bool(true),
            Qualifier::String("key".into()),
            Qualifier::field("tail"),
        ]
    );
}

#[test]
fn display_round_trip() {
    for text in [
        "request.auth.claims",
        "m[3]",
        "m[2u]",
        "m[true]",
        "a[\"b c\"].d",
    ] {
        assert_eq!(attr(text).to_string(), text);
    }
}

#[test]
fn parse_rejects_malformed_paths() {
    assert!("".parse::<Attribute>().is_err());
    assert!("1abc".parse::<Attribute>().is_err());
    assert!("a.".parse::<Attribute>().is_err());
    assert!("a[".parse::<Attribute>().is_err());
    assert!("a[3".parse::<Attribute>().is_err());
    assert!("a['x".parse::<Attribute>().is_err());
    assert!("a..b".parse::<Attribute>().is_err());
    // Wildcards belong to patterns.
    assert!("a.*".parse::<Attribute>().is_err());
}

#[test]
fn parse_pattern_wildcard_is_trailing_only() {
    let p = pattern("request.auth.*");
    assert_eq!(p.root(), "request");
    assert!("a.*.b".parse::<AttributePattern>().is_err());
}

#[test]
fn prefix_comparison() {
    let short = attr("a.b");
    let long = attr("a.b[0]");
    assert!(short.is_prefix_of(&long));
    assert!(short.is_prefix_of(&short));
    assert!(!long.is_prefix_of(&short));
    assert!(!attr("z.b").is_prefix_of(&long));
}

#[test]
fn pattern_full_match() {
    let p = pattern("request.auth");
    assert_eq!(p.match_against(&attr("request.auth")), PatternMatch::Full);
    // Longer attributes under a matched prefix are fully covered.
    assert_eq!(
        p.match_against(&attr("request.auth.claims")),
        PatternMatch::Full
    );
}

#[test]
fn pattern_partial_match() {
    let p = pattern("request.auth.claims");
    assert_eq!(p.match_against(&attr("request.auth")), PatternMatch::Partial);
    assert_eq!(p.match_against(&attr("request")), PatternMatch::Partial);
}

#[test]
fn pattern_miss() {
    let p = pattern("request.auth");
    assert_eq!(p.match_against(&attr("request.uri")), PatternMatch::Miss);
    assert_eq!(p.match_against(&attr("other.auth")), PatternMatch::Miss);
}

#[test]
fn wildcard_covers_any_qualifier() {
    let p = pattern("m.*");
    assert_eq!(p.match_against(&attr("m[3]")), PatternMatch::Full);
    assert_eq!(p.match_against(&attr("m.field")), PatternMatch::Full);
    assert_eq!(p.match_against(&attr("m")), PatternMatch::Partial);

    let p = AttributePattern::new("m").wildcard().select("x");
    assert_eq!(p.match_against(&attr("m[true].x")), PatternMatch::Full);
    assert_eq!(p.match_against(&attr("m[true].y")), PatternMatch::Miss);
}

#[test]
fn attribute_serde_round_trip() {
    let a = attr("request.auth[0]['k']");
    let json = serde_json::to_string(&a).unwrap();
    let back: Attribute = serde_json::from_str(&json).unwrap();
    assert_eq!(back, a);
}

#[test]
fn unknown_set_union_deduplicates() {
    let a = UnknownSet::singleton(attr("x.y"));
    let b: UnknownSet = [attr("x.y"), attr("a.b")].into_iter().collect();
    let merged = a.union(&b);

    assert_eq!(merged.len(), 2);
    assert!(merged.contains(&attr("x.y")));
    assert!(merged.contains(&attr("a.b")));

    // Union is symmetric on contents.
    assert_eq!(merged, b.union(&a));
}
