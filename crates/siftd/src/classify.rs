use std::io::Write;

use sift_variants::{ClusterMetadata, VariantManager, classify_job};

/// Tab-separated `job_name`, comma-joined tags and `category=value` pairs.
pub fn write_classifications(
    manager: &dyn VariantManager,
    release: &str,
    jobs: &[String],
    out: &mut dyn Write,
) -> std::io::Result<()> {
    writeln!(out, "job_name\ttags\tcategories")?;
    let cluster = ClusterMetadata::default();
    for job in jobs {
        let variants = classify_job(manager, job, release, &cluster);
        let categories = variants
            .categories()
            .into_iter()
            .map(|(category, value)| format!("{category}={value}"))
            .collect::<Vec<_>>();
        writeln!(
            out,
            "{}\t{}\t{}",
            job.replace(['\t', '\n', '\r'], " "),
            variants.tags().join(","),
            categories.join(",")
        )?;
    }
    Ok(())
}
