//! Prometheus text exposition format (version 0.0.4).

use std::fmt::Write;

use super::registry::{FamilySnapshot, MetricKind, SampleValue};

/// Content type served by the metrics endpoint.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render families as exposition text. No families renders an empty string.
pub fn render(families: &[FamilySnapshot]) -> String {
    let mut out = String::new();
    for family in families {
        render_family(&mut out, family);
    }
    out
}

fn render_family(out: &mut String, family: &FamilySnapshot) {
    let _ = writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help));
    let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind.as_str());

    for series in &family.series {
        match &series.value {
            SampleValue::Counter(v) => {
                write_sample(out, &family.name, "", &series.labels, None, &v.to_string());
            }
            SampleValue::Gauge(v) => {
                write_sample(out, &family.name, "", &series.labels, None, &format_float(*v));
            }
            SampleValue::Histogram(h) => {
                debug_assert_eq!(family.kind, MetricKind::Histogram);
                for (bound, count) in &h.buckets {
                    write_sample(
                        out,
                        &family.name,
                        "_bucket",
                        &series.labels,
                        Some(&format_float(*bound)),
                        &count.to_string(),
                    );
                }
                write_sample(out, &family.name, "_sum", &series.labels, None, &format_float(h.sum));
                write_sample(out, &family.name, "_count", &series.labels, None, &h.count.to_string());
            }
        }
    }
}

fn write_sample(
    out: &mut String,
    name: &str,
    suffix: &str,
    labels: &[(String, String)],
    le: Option<&str>,
    value: &str,
) {
    out.push_str(name);
    out.push_str(suffix);
    if !labels.is_empty() || le.is_some() {
        out.push('{');
        let mut first = true;
        let extra = le.map(|le| ("le", le));
        for (k, v) in labels.iter().map(|(k, v)| (k.as_str(), v.as_str())).chain(extra) {
            if !first {
                out.push(',');
            }
            first = false;
            let _ = write!(out, "{}=\"{}\"", k, escape_label_value(v));
        }
        out.push('}');
    }
    out.push(' ');
    out.push_str(value);
    out.push('\n');
}

pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::Registry;

    #[test]
    fn test_empty_registry_renders_nothing() {
        assert_eq!(render(&Registry::new(10).snapshot()), "");
    }

    #[test]
    fn test_counter_and_gauge() {
        let registry = Registry::new(10);
        registry
            .counter("app_requests_total", "Total HTTP requests", &["path", "method"])
            .unwrap()
            .with_labels(&["/", "GET"])
            .unwrap()
            .inc_by(3);
        registry
            .gauge("app_requests_in_flight", "In flight", &[])
            .unwrap()
            .with_labels(&[])
            .unwrap()
            .set(1.5);

        let text = render(&registry.snapshot());
        assert_eq!(
            text,
            "# HELP app_requests_in_flight In flight\n\
             # TYPE app_requests_in_flight gauge\n\
             app_requests_in_flight 1.5\n\
             # HELP app_requests_total Total HTTP requests\n\
             # TYPE app_requests_total counter\n\
             app_requests_total{method=\"GET\",path=\"/\"} 3\n"
        );
    }

    #[test]
    fn test_histogram_lines() {
        let registry = Registry::new(10);
        let h = registry
            .histogram("lat_seconds", "Latency", &["path"], &[0.1, 1.0])
            .unwrap()
            .with_labels(&["/"])
            .unwrap();
        h.observe(0.5);
        h.observe(0.5);

        let text = render(&registry.snapshot());
        assert!(text.contains("lat_seconds_bucket{path=\"/\",le=\"0.1\"} 0\n"));
        assert!(text.contains("lat_seconds_bucket{path=\"/\",le=\"1\"} 2\n"));
        assert!(text.contains("lat_seconds_bucket{path=\"/\",le=\"+Inf\"} 2\n"));
        assert!(text.contains("lat_seconds_sum{path=\"/\"} 1\n"));
        assert!(text.contains("lat_seconds_count{path=\"/\"} 2\n"));
    }

    #[test]
    fn test_escaping() {
        let registry = Registry::new(10);
        registry
            .counter("c", "line\nbreak \\ here", &["v"])
            .unwrap()
            .with_labels(&["say \"hi\"\n"])
            .unwrap()
            .inc();

        let text = render(&registry.snapshot());
        assert!(text.contains("# HELP c line\\nbreak \\\\ here\n"));
        assert!(text.contains("c{v=\"say \\\"hi\\\"\\n\"} 1\n"));
    }
}
