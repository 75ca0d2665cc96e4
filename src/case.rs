//! Identifier case conversion and slugs.

/// Convert a single identifier from camelCase / PascalCase to snake_case.
/// e.g. "ProductCategory" -> "product_category", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Lowercase URL slug: alphanumerics kept, every other run collapsed to one `-`.
/// e.g. "Áo thun, Size M" -> "áo-thun-size-m"
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Slug followed by a short random suffix so repeated names stay distinct.
pub fn slugify_unique(s: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(6).collect();
    let base = slugify(s);
    if base.is_empty() {
        suffix
    } else {
        format!("{}-{}", base, suffix)
    }
}
