//! Deterministic synthetic page generation.
//!
//! When live collection of a site fails (or the host is on the known-bad
//! list), the collector substitutes a generated page instead of propagating
//! the error. Generation is a pure function of `(url, business_type)`: a
//! digest of the URL selects one of a small fixed set of template variants,
//! so re-running against the same stale site never flaps.

use sha2::{Digest, Sha256};

use crate::collector::Collected;
use crate::models::CollectionMethod;

struct Variant {
    name: &'static str,
    palette: [&'static str; 4],
    fonts: [&'static str; 2],
}

const VARIANTS: [Variant; 4] = [
    Variant {
        name: "clean",
        palette: ["#1a1a2e", "#16213e", "#0f3460", "#e94560"],
        fonts: ["Inter", "Georgia"],
    },
    Variant {
        name: "warm",
        palette: ["#fff8f0", "#d4a373", "#bc6c25", "#283618"],
        fonts: ["Playfair Display", "Lato"],
    },
    Variant {
        name: "bold",
        palette: ["#0b0c10", "#1f2833", "#66fcf1", "#45a29e"],
        fonts: ["Montserrat", "Roboto"],
    },
    Variant {
        name: "soft",
        palette: ["#f7f9fb", "#dbe2ef", "#3f72af", "#112d4e"],
        fonts: ["Nunito", "Merriweather"],
    },
];

/// Which template variant a URL maps to. Stable across processes.
fn variant_for(url: &str) -> &'static Variant {
    let digest = Sha256::digest(url.as_bytes());
    let mut selector = [0u8; 8];
    selector.copy_from_slice(&digest[..8]);
    let index = (u64::from_le_bytes(selector) % VARIANTS.len() as u64) as usize;
    &VARIANTS[index]
}

/// Generate the synthetic substitute for a failed or skipped site.
pub fn synthetic_page(url: &str, business_type: &str) -> Collected {
    let variant = variant_for(url);
    let [background, surface, accent, text] = variant.palette;
    let [heading_font, body_font] = variant.fonts;

    let html = format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{business_type} — {variant_name}</title>
<meta name="description" content="A {business_type} business website ({variant_name} template).">
</head>
<body>
<header class="site-header"><h1>{business_type}</h1></header>
<nav class="main-nav"><a href="#services">Services</a> <a href="#about">About</a> <a href="#contact">Contact</a></nav>
<main>
<section id="services" class="flex-row"><h2>Our Services</h2><p>Quality {business_type} services.</p></section>
<section id="about"><h2>About Us</h2><img src="about.jpg" alt="Our {business_type} team"><p>A local {business_type}.</p></section>
<section id="contact"><h2>Contact</h2><label for="email">Email</label><input id="email" aria-label="Email address"></section>
</main>
<footer class="site-footer"><p>Source: {url}</p></footer>
</body>
</html>
"##,
        business_type = business_type,
        variant_name = variant.name,
        url = url,
    );

    let css = format!(
        r#"body {{ background: {background}; color: {text}; font-family: "{body_font}", sans-serif; }}
h1, h2 {{ font-family: "{heading_font}", serif; color: {accent}; }}
.site-header {{ background: {surface}; }}
.main-nav {{ display: flex; gap: 1rem; }}
.flex-row {{ display: flex; }}
main {{ display: grid; grid-template-columns: 1fr; }}
@media (max-width: 600px) {{ .main-nav {{ flex-direction: column; }} }}
"#,
    );

    Collected {
        html,
        css,
        method: CollectionMethod::Synthetic,
        load_time_ms: 0,
    }
}
