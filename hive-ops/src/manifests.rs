//! Renders the fleet description files consumed by puppet, the HTTP
//! proxy, the monitoring daemon and the cluster bootstrap scripts.
//!
//! Every generator is a pure function from an ordered address list to
//! file content; [`write_manifest`] is the only place that touches
//! the filesystem. Output files are overwritten unconditionally.

use std::{
    fs::File,
    io::{self, Write},
};

use serde::{Deserialize, Serialize};

/// HTTP port every node serves on.
pub const HTTP_PORT: u16 = 9696;
/// Gossip port every node listens on.
pub const GOSSIP_PORT: u16 = 9797;

/// Identity file passed to cssh for root access to the fleet.
const CSSH_IDENTITY: &str = "~/.amazon/eu-kp-1";

/// One running instance's addresses, in fleet discovery order.
/// Order matters: seed generation joins each node to its predecessor.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AddressPair {
    /// Public DNS name.
    pub external: String,
    /// Private DNS name.
    pub internal: String,
    /// Private IPv4, derived from the private DNS name.
    pub internal_ip: String,
}

impl AddressPair {
    pub fn new(external: &str, internal: &str) -> Self {
        Self {
            external: external.to_string(),
            internal: internal.to_string(),
            internal_ip: internal_name_to_ip(internal),
        }
    }
}

/// Derives the private IPv4 from an EC2 private DNS name,
/// e.g. "ip-10-1-2-3.eu-west-1.compute.internal" to "10.1.2.3".
pub fn internal_name_to_ip(internal_name: &str) -> String {
    let stripped = internal_name
        .strip_prefix("ip-")
        .unwrap_or(internal_name);
    let stripped = match stripped.find('.') {
        Some(idx) => &stripped[..idx],
        None => stripped,
    };
    stripped.replace('-', ".")
}

/// One internal address per line.
pub fn render_node_list(pairs: &[AddressPair]) -> String {
    let mut out = String::new();
    for pair in pairs.iter() {
        out.push_str(&pair.internal);
        out.push('\n');
    }
    out
}

/// Derives the library filename shipped inside the distribution,
/// e.g. "hive-1.0.tar.gz" to "hive-1.0.jar".
pub fn library_filename(dist_filename: &str) -> String {
    let base = dist_filename
        .strip_suffix(".tar.gz")
        .unwrap_or(dist_filename);
    format!("{}.jar", base)
}

/// Puppet manifest: a basenode block with the distribution variables,
/// then one inheriting node block per instance keyed by its internal
/// address.
pub fn render_puppet_manifest(
    pairs: &[AddressPair],
    group: &str,
    repo_url: &str,
    dist_filename: &str,
    upload_to_s3: bool,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("node {}-basenode {{\n", group));
    out.push_str(&format!("  $repo_url = \"{}\"\n", repo_url));
    out.push_str(&format!("  $dist = \"{}\"\n", dist_filename));
    out.push_str(&format!(
        "  $lib = \"{}\"\n",
        library_filename(dist_filename)
    ));
    out.push_str(&format!("  $s3 = \"{}\"\n", upload_to_s3));
    out.push_str("  $internal_ip_list = [ ");
    for (i, pair) in pairs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("\"{}\"", pair.internal_ip));
    }
    out.push_str(" ]\n");
    out.push_str("  include hive, ganglia, ec2\n");
    out.push_str("}\n");
    out.push('\n');

    for pair in pairs.iter() {
        out.push_str(&format!(
            "node '{}' inherits {}-basenode {{}}\n",
            pair.internal, group
        ));
    }
    out
}

/// Seed list over a slice: "external,internal,previous_internal" per
/// consecutive pair. The first entry has no predecessor and is
/// skipped, so a slice of length L yields max(0, L-1) lines.
pub fn render_seed_file(pairs: &[AddressPair]) -> String {
    let mut out = String::new();
    let mut previous_internal: Option<&str> = None;
    for pair in pairs.iter() {
        if let Some(prev) = previous_internal {
            out.push_str(&format!("{},{},{}\n", pair.external, pair.internal, prev));
        }
        previous_internal = Some(&pair.internal);
    }
    out
}

/// Comma-joined "external:9696" tokens on a single line.
pub fn render_proxy_file(pairs: &[AddressPair]) -> String {
    let mut out = String::new();
    for (i, pair) in pairs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{}:{}", pair.external, HTTP_PORT));
    }
    out.push('\n');
    out
}

/// "internal:9797, external:9696" per instance.
pub fn render_address_file(pairs: &[AddressPair]) -> String {
    let mut out = String::new();
    for pair in pairs.iter() {
        out.push_str(&format!(
            "{}:{}, {}:{}\n",
            pair.internal, GOSSIP_PORT, pair.external, HTTP_PORT
        ));
    }
    out
}

/// Ganglia data sources, one per instance.
pub fn render_monitoring_file(pairs: &[AddressPair]) -> String {
    let mut out = String::new();
    for pair in pairs.iter() {
        out.push_str(&format!(
            "data_source \"{}\" {}\n",
            pair.external, pair.external
        ));
    }
    out
}

/// Three JS arrays of equal length: node addresses, HTTP ports,
/// gossip ports.
pub fn render_demo_nodes_file(pairs: &[AddressPair]) -> String {
    let mut out = String::new();

    out.push_str("var nodes = [\n");
    for (i, pair) in pairs.iter().enumerate() {
        if i > 0 {
            out.push_str(",\n");
        }
        out.push_str(&format!("\"{}\"", pair.external));
    }
    out.push_str("];\n\n");

    out.push_str("var http_port = [\n");
    for i in 0..pairs.len() {
        if i > 0 {
            out.push_str(",\n");
        }
        out.push_str(&format!("{}", HTTP_PORT));
    }
    out.push_str("];\n\n");

    out.push_str("var gossip_port = [\n");
    for i in 0..pairs.len() {
        if i > 0 {
            out.push_str(",\n");
        }
        out.push_str(&format!("{}", GOSSIP_PORT));
    }
    out.push_str("];\n");

    out
}

/// One cssh invocation covering every external address in the slice.
pub fn render_cssh_file(pairs: &[AddressPair]) -> String {
    let mut out = String::new();
    out.push_str(&format!("cssh -o \"-i {} -l root\" ", CSSH_IDENTITY));
    for pair in pairs.iter() {
        out.push_str(&pair.external);
        out.push(' ');
    }
    out.push('\n');
    out
}

/// Index where the fleet is split into two independently seedable
/// halves.
pub fn midpoint(pairs: &[AddressPair]) -> usize {
    pairs.len() / 2
}

/// Writes one rendered manifest, overwriting any existing file.
/// Not atomic; a crash mid-write leaves a partial file.
pub fn write_manifest(path: &str, content: &str) -> io::Result<()> {
    log::info!("writing manifest '{}'", path);
    let mut f = File::create(path)?;
    f.write_all(content.as_bytes())
}

#[cfg(test)]
fn pairs(n: usize) -> Vec<AddressPair> {
    (0..n)
        .map(|i| {
            AddressPair::new(
                &format!("ec2-{}.compute.amazonaws.com", i),
                &format!("ip-10-0-0-{}.eu-west-1.compute.internal", i),
            )
        })
        .collect()
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- manifests::test_internal_name_to_ip --exact --show-output
#[test]
fn test_internal_name_to_ip() {
    assert_eq!(
        internal_name_to_ip("ip-10-226-42-7.eu-west-1.compute.internal"),
        "10.226.42.7"
    );
    assert_eq!(internal_name_to_ip("ip-10-0-0-1"), "10.0.0.1");
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- manifests::test_seed_file --exact --show-output
#[test]
fn test_seed_file() {
    let ps = pairs(4);

    // slice of length L yields L-1 lines, each joining a node to its
    // predecessor's internal address
    let seed = render_seed_file(&ps);
    let lines: Vec<&str> = seed.lines().collect();
    assert_eq!(lines.len(), 3);
    for (i, line) in lines.iter().enumerate() {
        let expected = format!(
            "{},{},{}",
            ps[i + 1].external,
            ps[i + 1].internal,
            ps[i].internal
        );
        assert_eq!(*line, expected);
    }

    assert_eq!(render_seed_file(&ps[..1]), "");
    assert_eq!(render_seed_file(&[]), "");
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- manifests::test_seed_split --exact --show-output
#[test]
fn test_seed_split() {
    for n in [2usize, 5, 6, 9] {
        let ps = pairs(n);
        let mid = midpoint(&ps);
        assert_eq!(mid, n / 2);

        let first = &ps[..mid];
        let second = &ps[mid..];
        assert_eq!(first.len(), mid);
        assert_eq!(second.len(), n - mid);

        // the join slice bridges the last first-half entry to the
        // first second-half entry with exactly one line
        let join = render_seed_file(&ps[mid - 1..=mid]);
        let lines: Vec<&str> = join.lines().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            format!(
                "{},{},{}",
                ps[mid].external,
                ps[mid].internal,
                ps[mid - 1].internal
            )
        );
    }
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- manifests::test_proxy_file --exact --show-output
#[test]
fn test_proxy_file() {
    let ps = pairs(3);
    let proxy = render_proxy_file(&ps);
    assert_eq!(
        proxy,
        format!(
            "{}:9696,{}:9696,{}:9696\n",
            ps[0].external, ps[1].external, ps[2].external
        )
    );

    // empty fleet renders a single blank line
    assert_eq!(render_proxy_file(&[]), "\n");
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- manifests::test_demo_nodes_file --exact --show-output
#[test]
fn test_demo_nodes_file() {
    let ps = pairs(4);
    let demo = render_demo_nodes_file(&ps);

    let addresses = demo.matches(".compute.amazonaws.com").count();
    assert_eq!(addresses, 4);
    assert_eq!(demo.matches("9696").count(), 4);
    assert_eq!(demo.matches("9797").count(), 4);
    assert!(demo.starts_with("var nodes = [\n"));
    assert!(demo.contains("var http_port = [\n"));
    assert!(demo.contains("var gossip_port = [\n"));

    let empty = render_demo_nodes_file(&[]);
    assert_eq!(empty.matches("];").count(), 3);
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- manifests::test_puppet_manifest --exact --show-output
#[test]
fn test_puppet_manifest() {
    let ps = pairs(2);
    let pp = render_puppet_manifest(&ps, "hive-dev", "hive.s3.amazonaws.com", "hive-1.0.tar.gz", true);

    assert!(pp.starts_with("node hive-dev-basenode {\n"));
    assert!(pp.contains("  $repo_url = \"hive.s3.amazonaws.com\"\n"));
    assert!(pp.contains("  $dist = \"hive-1.0.tar.gz\"\n"));
    assert!(pp.contains("  $lib = \"hive-1.0.jar\"\n"));
    assert!(pp.contains("  $s3 = \"true\"\n"));
    assert!(pp.contains("  $internal_ip_list = [ \"10.0.0.0\", \"10.0.0.1\" ]\n"));
    assert!(pp.contains("  include hive, ganglia, ec2\n"));
    for pair in ps.iter() {
        assert!(pp.contains(&format!(
            "node '{}' inherits hive-dev-basenode {{}}\n",
            pair.internal
        )));
    }
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- manifests::test_line_formats --exact --show-output
#[test]
fn test_line_formats() {
    let ps = pairs(2);

    let nodes = render_node_list(&ps);
    assert_eq!(
        nodes,
        format!("{}\n{}\n", ps[0].internal, ps[1].internal)
    );

    let addrs = render_address_file(&ps);
    assert_eq!(
        addrs,
        format!(
            "{}:9797, {}:9696\n{}:9797, {}:9696\n",
            ps[0].internal, ps[0].external, ps[1].internal, ps[1].external
        )
    );

    let mon = render_monitoring_file(&ps);
    assert_eq!(
        mon,
        format!(
            "data_source \"{}\" {}\ndata_source \"{}\" {}\n",
            ps[0].external, ps[0].external, ps[1].external, ps[1].external
        )
    );

    let cssh = render_cssh_file(&ps[..1]);
    assert_eq!(
        cssh,
        format!("cssh -o \"-i ~/.amazon/eu-kp-1 -l root\" {} \n", ps[0].external)
    );
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- manifests::test_write_manifest --exact --show-output
#[test]
fn test_write_manifest() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("hive-dev.new");
    let path = path.as_os_str().to_str().unwrap();

    write_manifest(path, "a\nb\n").unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "a\nb\n");

    // overwrites unconditionally
    write_manifest(path, "c\n").unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "c\n");
}
