//! Static test-content rubric shared by Scribe's self-validation and
//! Critic's pre-validation pass (spec.md §4.3: both reject the same
//! forbidden-pattern list, so the check lives once rather than twice).

use kaya_core::worker::ScribeValidation;

const FORBIDDEN_PATTERNS: &[(&str, &str)] = &[
    (":nth-child", "index-based selector (:nth-child)"),
    (":nth-of-type", "index-based selector (:nth-of-type)"),
    ("css-", "generated-looking CSS class selector"),
    ("waitForTimeout", "fixed-duration wait"),
    ("sleep(", "fixed-duration wait"),
    ("password123", "hard-coded credential"),
    ("http://localhost", "hard-coded URL"),
    ("https://localhost", "hard-coded URL"),
];

/// Runs the static checks spec.md §4.3 requires of every generated test:
/// at least one assertion, at least one screenshot, attribute-based
/// selectors, valid (brace-balanced) syntax, and none of the forbidden
/// patterns above.
pub fn validate(content: &str) -> ScribeValidation {
    let assertion_count = count_occurrences(content, "expect(") + count_occurrences(content, "assert");
    let screenshot_count = count_occurrences(content, "screenshot");
    let uses_testid = content.contains("data-testid");
    let syntax_valid = braces_balanced(content);

    let mut issues = Vec::new();
    if assertion_count == 0 {
        issues.push("no assertions found".to_string());
    }
    if screenshot_count == 0 {
        issues.push("no screenshot capture found".to_string());
    }
    if !uses_testid {
        issues.push("does not select by data-testid".to_string());
    }
    if !syntax_valid {
        issues.push("unbalanced braces".to_string());
    }
    for (pattern, label) in FORBIDDEN_PATTERNS {
        if content.contains(pattern) {
            issues.push(label.to_string());
        }
    }

    ScribeValidation {
        assertion_count: assertion_count as u32,
        screenshot_count: screenshot_count as u32,
        uses_testid,
        syntax_valid,
        issues,
    }
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

fn braces_balanced(content: &str) -> bool {
    let mut depth: i32 = 0;
    for ch in content.chars() {
        match ch {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_test_has_no_issues() {
        let content = r#"
            test('checkout', async () => {
                await page.click('[data-testid="submit"]');
                await expect(page.locator('[data-testid="total"]')).toHaveText('$10');
                await page.screenshot({ path: 'checkout.png' });
            });
        "#;
        let validation = validate(content);
        assert!(validation.issues.is_empty());
        assert!(validation.uses_testid);
        assert!(validation.syntax_valid);
    }

    #[test]
    fn index_selector_and_fixed_wait_are_flagged() {
        let content = "page.click('li:nth-child(2)'); page.waitForTimeout(5000);";
        let validation = validate(content);
        assert!(validation.issues.iter().any(|i| i.contains("index-based selector")));
        assert!(validation.issues.iter().any(|i| i.contains("fixed-duration wait")));
    }

    #[test]
    fn unbalanced_braces_fail_syntax_check() {
        let validation = validate("function broken() { console.log('oops');");
        assert!(!validation.syntax_valid);
    }
}
