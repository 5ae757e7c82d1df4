use crate::types::{Category, CategoryLists, CorrectionResult, PairId, Thresholds};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes category membership lists, one pair key per line
#[derive(Debug, Clone)]
pub struct ReportWriter {
    info_dir: PathBuf,
    suffix: String,
}

impl ReportWriter {
    pub fn new<P: AsRef<Path>>(info_dir: P, suffix: &str) -> Self {
        Self {
            info_dir: info_dir.as_ref().to_path_buf(),
            suffix: suffix.to_string(),
        }
    }

    /// Report file of one category at the given thresholds
    pub fn category_file(&self, category: Category, thresholds: &Thresholds) -> PathBuf {
        let stem = match category {
            Category::Good => "132good_ifg_uncorrected",
            Category::Bad => "132bad_ifg",
            Category::ModeCorrected => "132corrected_by_component_mode_ifg",
            Category::IntegerCorrected => "132corrected_by_nearest_integer_ifg",
        };
        self.info_dir
            .join(format!("{}{}_{}.txt", stem, self.suffix, thresholds))
    }

    pub fn strong_link_file(&self) -> PathBuf {
        self.info_dir
            .join(format!("132strong_link_ifgs{}.txt", self.suffix))
    }

    /// Write all four category lists, replacing earlier files of the same name
    pub fn write_categories(
        &self,
        lists: &CategoryLists,
        thresholds: &Thresholds,
    ) -> CorrectionResult<Vec<PathBuf>> {
        fs::create_dir_all(&self.info_dir)?;
        let mut written = Vec::with_capacity(4);
        for category in [
            Category::Bad,
            Category::ModeCorrected,
            Category::IntegerCorrected,
            Category::Good,
        ] {
            let path = self.category_file(category, thresholds);
            write_pair_list(&path, lists.list(category))?;
            written.push(path);
        }
        log::info!(
            "Saved lists at thresholds {:.2}/{:.2}: {} good, {} mode, {} integer, {} bad",
            thresholds.correction,
            thresholds.target,
            lists.good.len(),
            lists.mode_corrected.len(),
            lists.integer_corrected.len(),
            lists.bad.len()
        );
        Ok(written)
    }

    pub fn write_strong_links(&self, strong_links: &BTreeSet<PairId>) -> CorrectionResult<PathBuf> {
        fs::create_dir_all(&self.info_dir)?;
        let path = self.strong_link_file();
        write_pair_list(&path, strong_links)?;
        log::info!("{} strong links saved to {}", strong_links.len(), path.display());
        Ok(path)
    }
}

pub fn write_pair_list<P: AsRef<Path>>(path: P, pairs: &BTreeSet<PairId>) -> CorrectionResult<()> {
    let content: String = pairs.iter().map(|pair| format!("{}\n", pair)).collect();
    fs::write(path, content)?;
    Ok(())
}

/// Read a list written by [`write_pair_list`]; blank lines are skipped
pub fn read_pair_list<P: AsRef<Path>>(path: P) -> CorrectionResult<Vec<PairId>> {
    fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::parse::<PairId>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pair(key: &str) -> PairId {
        key.parse().unwrap()
    }

    #[test]
    fn test_category_file_names() {
        let writer = ReportWriter::new("/info", "_x");
        let t = Thresholds::new(0.2, 0.25);
        assert_eq!(
            writer.category_file(Category::ModeCorrected, &t),
            PathBuf::from("/info/132corrected_by_component_mode_ifg_x_0.20_0.25.txt")
        );
        assert_eq!(
            writer.category_file(Category::Good, &t),
            PathBuf::from("/info/132good_ifg_uncorrected_x_0.20_0.25.txt")
        );
        assert_eq!(
            writer.strong_link_file(),
            PathBuf::from("/info/132strong_link_ifgs_x.txt")
        );
    }

    #[test]
    fn test_lists_are_sorted_and_overwritten() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path(), "");
        let t = Thresholds::new(0.3, 0.3);

        let mut lists = CategoryLists::default();
        lists.insert(pair("20200115_20200127"), Category::Bad);
        lists.insert(pair("20200103_20200115"), Category::Bad);
        writer.write_categories(&lists, &t).unwrap();

        let bad_file = writer.category_file(Category::Bad, &t);
        assert_eq!(
            fs::read_to_string(&bad_file).unwrap(),
            "20200103_20200115\n20200115_20200127\n"
        );

        let mut fewer = CategoryLists::default();
        fewer.insert(pair("20200103_20200115"), Category::Bad);
        writer.write_categories(&fewer, &t).unwrap();
        assert_eq!(read_pair_list(&bad_file).unwrap(), vec![pair("20200103_20200115")]);

        let good_file = writer.category_file(Category::Good, &t);
        assert_eq!(fs::read_to_string(good_file).unwrap(), "");
    }
}
