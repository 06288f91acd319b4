use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use anyhow::{bail, Context, Result};

/// 組み込みのaliasと変換先。変換先は課題キーか別のalias。
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("proserve", "DEL-340"),
    ("devops", "HO-3201"),
    ("cdc", "PLAT-178"),
    ("engineering", "ENG-778"),
    ("support", "proserve"),
    ("ps", "proserve"),
    ("sup", "support"),
    ("ho", "devops"),
    ("eng", "engineering"),
];

/// aliasから課題キーへの対応表。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::from_pairs(BUILTIN_ALIASES.iter().copied())
    }
}

impl AliasTable {
    /// aliasと変換先の組から新しい`AliasTable`を返す。
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let aliases = pairs
            .into_iter()
            .map(|(alias, target)| (alias.to_string(), target.to_string()))
            .collect();
        Self { aliases }
    }

    /// JSONファイルのaliasを組み込みの対応表に上書きで追加する。
    ///
    /// ファイルは`{"alias": "変換先"}`形式のオブジェクトとする。
    pub fn extend_from_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read alias file: {}", path.display()))?;
        let aliases: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse alias file: {}", path.display()))?;
        self.aliases.extend(aliases);
        Ok(())
    }

    /// aliasを対応表に存在しなくなるまで辿り、最終的な値を返す。
    ///
    /// 対応表に存在しない名前はそのまま返す。循環している場合はエラーを返す。
    pub fn resolve<'a>(&'a self, name: &'a str) -> Result<&'a str> {
        let mut visited = HashSet::new();
        let mut current = name;
        while let Some(target) = self.aliases.get(current) {
            if !visited.insert(current) {
                bail!("Alias cycle detected while resolving '{}' at '{}'", name, current);
            }
            current = target.as_str();
        }
        Ok(current)
    }
}
