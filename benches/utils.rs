use rand::{Rng, SeedableRng, rngs::StdRng};

/// Generate n random template sources to use in the benchmark
pub fn generate_random_templates(n: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(42); // Fixed seed for reproducibility
    let mut templates = Vec::with_capacity(n);

    for _ in 0..n {
        let mut source = String::new();
        let defines = rng.random_range(1..5);
        for i in 0..defines {
            source.push_str(&format!("{{{{define \"part_{i}\"}}}}"));
            push_body(&mut rng, &mut source);
            source.push_str("{{end}}");
        }

        source.push_str("<html>\n");
        push_body(&mut rng, &mut source);
        for i in 0..defines {
            source.push_str(&format!("{{{{template \"part_{i}\" .}}}}\n"));
        }
        source.push_str("</html>\n");
        templates.push(source);
    }

    templates
}

/// Append a random mix of text and control structures
fn push_body(rng: &mut StdRng, source: &mut String) {
    let items = rng.random_range(3..12);
    for _ in 0..items {
        let field = random_string(rng, 3, 8);
        match rng.random_range(0..5) {
            0 => source.push_str(&format!("<p class=\"{field}\">\"quoted\" & <b>bold</b></p>\n")),
            1 => source.push_str(&format!("{{{{.{field} | printf \"%q\"}}}}")),
            2 => source.push_str(&format!(
                "{{{{if .{field}}}}}yes{{{{else if not .{field}}}}}no{{{{end}}}}"
            )),
            3 => source.push_str(&format!(
                "{{{{range $i, $e := .{field}}}}}<li>{{{{$i}}}}: {{{{$e.Name}}}}</li>{{{{else}}}}none{{{{end}}}}"
            )),
            _ => source.push_str(&format!("{{{{with .{field}}}}}{{{{.}}}}{{{{end}}}}")),
        }
    }
}

/// Generate a random string with length between min and max
fn random_string(rng: &mut StdRng, min_len: usize, max_len: usize) -> String {
    let charset = "abcdefghijklmnopqrstuvwxyz";
    let len = rng.random_range(min_len..=max_len);

    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset.chars().nth(idx).unwrap()
        })
        .collect()
}

// Print binary size information - can be used from individual benchmarks
pub fn print_binary_size() {
    let binary_path = std::env::current_exe().unwrap();
    let metadata = std::fs::metadata(binary_path.clone()).unwrap();
    let size_bytes = metadata.len();
    let size_kb = size_bytes as f64 / 1024.0;
    let size_mb = size_kb / 1024.0;

    println!(
        "Binary size: {:.2} MB ({:.2} KB, {} bytes)",
        size_mb, size_kb, size_bytes
    );
    println!("Binary path: {}", binary_path.display());
}
