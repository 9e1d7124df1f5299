use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::config::ComposerJson;

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx"];
const STYLE_EXTENSIONS: &[&str] = &["css", "scss"];
const INDEX_FILES: &[&str] = &["index.js", "index.mjs", "index.cjs", "index.jsx"];

/// Directories Vite/Mix style bundlers resolve `@/` against.
const SCRIPT_ALIASES: &[(&str, &str)] = &[("@/", "resources/js/"), ("~/", "resources/")];

const VIEWS_DIR: &str = "resources/views";
const COMPONENT_NAMESPACE: &str = "App\\View\\Components\\";

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `forms.input` → `Forms\Input`, `nav-link` → `NavLink`.
pub fn studly(name: &str) -> String {
    name.split('.')
        .map(|segment| {
            segment
                .split(|c| c == '-' || c == '_')
                .filter(|w| !w.is_empty())
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                        None => String::new(),
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\\")
}

/// Maps symbolic names (classes, views, components, module specifiers) to
/// files known to the current analysis. Built once, then queried read-only.
#[derive(Debug, Clone)]
pub struct SymbolResolver {
    root: PathBuf,
    psr4: Vec<(String, PathBuf)>,
    files: HashSet<PathBuf>,
    classes: HashMap<String, PathBuf>,
    views: HashMap<String, PathBuf>,
    by_file_name: HashMap<String, Vec<PathBuf>>,
}

impl SymbolResolver {
    pub fn new(root: impl Into<PathBuf>, composer: Option<&ComposerJson>) -> Self {
        let root = root.into();
        let mut psr4: Vec<(String, PathBuf)> = composer
            .map(|c| c.psr4_roots())
            .unwrap_or_default()
            .into_iter()
            .map(|(prefix, dir)| (prefix.trim_start_matches('\\').to_string(), root.join(dir)))
            .collect();
        if psr4.is_empty() {
            psr4.push(("App\\".to_string(), root.join("app")));
        }
        // Longest prefix first so nested namespaces win.
        psr4.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            root,
            psr4,
            files: HashSet::new(),
            classes: HashMap::new(),
            views: HashMap::new(),
            by_file_name: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn add_file(&mut self, path: &Path) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            self.by_file_name
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(path.to_path_buf());
        }
        self.files.insert(path.to_path_buf());
    }

    pub fn add_class(&mut self, fqcn: &str, path: &Path) {
        self.classes
            .insert(fqcn.trim_start_matches('\\').to_ascii_lowercase(), path.to_path_buf());
    }

    pub fn add_view(&mut self, name: &str, path: &Path) {
        self.views.insert(name.to_string(), path.to_path_buf());
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    fn known(&self, path: PathBuf) -> Option<PathBuf> {
        self.files.contains(&path).then_some(path)
    }

    /// Declared class first, then the PSR-4 location of the name.
    pub fn resolve_class(&self, fqcn: &str) -> Option<PathBuf> {
        let fqcn = fqcn.trim_start_matches('\\');
        if let Some(path) = self.classes.get(&fqcn.to_ascii_lowercase()) {
            return Some(path.clone());
        }
        self.psr4_path(fqcn).and_then(|p| self.known(p))
    }

    pub fn psr4_path(&self, fqcn: &str) -> Option<PathBuf> {
        let fqcn = fqcn.trim_start_matches('\\');
        self.psr4.iter().find_map(|(prefix, dir)| {
            let rest = fqcn.strip_prefix(prefix.as_str())?;
            Some(dir.join(format!("{}.php", rest.replace('\\', "/"))))
        })
    }

    /// `products.index` or `products/index`; namespaced `pkg::view` names
    /// live outside the project and never resolve.
    pub fn resolve_view(&self, name: &str) -> Option<PathBuf> {
        if name.contains("::") {
            return None;
        }
        let dotted = name.trim().replace('/', ".");
        if let Some(path) = self.views.get(&dotted) {
            return Some(path.clone());
        }
        let relative = dotted.replace('.', "/");
        self.known(self.root.join(VIEWS_DIR).join(format!("{}.blade.php", relative)))
    }

    /// Anonymous component template and class-based component, when present.
    pub fn resolve_component(&self, name: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let view = format!("components.{}", name);
        if let Some(path) = self
            .resolve_view(&view)
            .or_else(|| self.resolve_view(&format!("{}.index", view)))
        {
            out.push(path);
        }
        if let Some(path) = self.resolve_class(&format!("{}{}", COMPONENT_NAMESPACE, studly(name))) {
            out.push(path);
        }
        out
    }

    fn try_file(&self, base: &Path, extensions: &[&str]) -> Option<PathBuf> {
        let base = normalize(base);
        if self.files.contains(&base) {
            return Some(base);
        }
        let raw = base.to_string_lossy();
        for ext in extensions {
            if let Some(found) = self.known(PathBuf::from(format!("{}.{}", raw, ext))) {
                return Some(found);
            }
        }
        INDEX_FILES
            .iter()
            .find_map(|index| self.known(base.join(index)))
    }

    fn module_base(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            return Some(from.parent()?.join(specifier));
        }
        if let Some(rest) = specifier.strip_prefix('/') {
            return Some(self.root.join(rest));
        }
        for (alias, dir) in SCRIPT_ALIASES {
            if let Some(rest) = specifier.strip_prefix(alias) {
                return Some(self.root.join(dir).join(rest));
            }
        }
        // `resources/js/app.js` style paths from `@vite` and `mix()`.
        if specifier.starts_with("resources/") || specifier.starts_with("public/") {
            return Some(self.root.join(specifier));
        }
        None
    }

    /// Bare package specifiers (`axios`, `lodash/debounce`) are external.
    pub fn resolve_script(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        let base = self.module_base(specifier, from)?;
        self.try_file(&base, SCRIPT_EXTENSIONS)
            .or_else(|| self.try_file(&base, STYLE_EXTENSIONS))
    }

    /// CSS `@import` and Sass `@use`, including `_partial` names.
    pub fn resolve_stylesheet(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        let specifier = specifier.trim_start_matches('~');
        let base = match self.module_base(specifier, from) {
            Some(base) => base,
            None => from.parent()?.join(specifier),
        };
        if let Some(found) = self.try_file(&base, STYLE_EXTENSIONS) {
            return Some(found);
        }
        let name = base.file_name()?.to_str()?;
        self.try_file(&base.with_file_name(format!("_{}", name)), STYLE_EXTENSIONS)
    }

    /// Asset paths are tried relative to the referencing file, the root,
    /// `public/` and `resources/`, then by unique file name.
    pub fn resolve_asset(&self, reference: &str, from: &Path) -> Option<PathBuf> {
        let cleaned = reference.trim_start_matches("./");
        let stripped = cleaned.trim_start_matches('/');
        let candidates = [
            from.parent().map(|p| p.join(cleaned)),
            Some(self.root.join(stripped)),
            Some(self.root.join("public").join(stripped)),
            Some(self.root.join("resources").join(stripped)),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(found) = self.known(normalize(&candidate)) {
                return Some(found);
            }
        }
        let name = Path::new(reference).file_name()?.to_str()?.to_ascii_lowercase();
        match self.by_file_name.get(&name).map(Vec::as_slice) {
            Some([only]) => Some(only.clone()),
            _ => None,
        }
    }

    /// Every known file with this (case-insensitive) file name.
    pub fn files_named(&self, name: &str) -> &[PathBuf] {
        self.by_file_name
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Autoload, Psr4Paths};

    fn resolver() -> SymbolResolver {
        let mut r = SymbolResolver::new("/p", None);
        for f in [
            "/p/app/Models/User.php",
            "/p/app/View/Components/Alert.php",
            "/p/resources/views/products/index.blade.php",
            "/p/resources/views/components/alert.blade.php",
            "/p/resources/views/components/forms/input.blade.php",
            "/p/resources/js/app.js",
            "/p/resources/js/utils/index.js",
            "/p/resources/js/cart.mjs",
            "/p/resources/css/app.css",
            "/p/resources/css/_buttons.scss",
            "/p/public/images/logo.png",
        ] {
            r.add_file(Path::new(f));
        }
        r
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/p/a/./b/../c.js")), PathBuf::from("/p/a/c.js"));
    }

    #[test]
    fn test_studly() {
        assert_eq!(studly("forms.input"), "Forms\\Input");
        assert_eq!(studly("nav-link"), "NavLink");
    }

    #[test]
    fn test_psr4_default_and_declared_classes() {
        let mut r = resolver();
        assert_eq!(
            r.resolve_class("\\App\\Models\\User"),
            Some(PathBuf::from("/p/app/Models/User.php"))
        );
        assert_eq!(r.resolve_class("App\\Models\\Missing"), None);
        r.add_class("Legacy\\Thing", Path::new("/p/lib/thing.php"));
        assert_eq!(
            r.resolve_class("legacy\\thing"),
            Some(PathBuf::from("/p/lib/thing.php"))
        );
    }

    #[test]
    fn test_composer_psr4_roots() {
        let mut composer = ComposerJson::default();
        composer.autoload = Autoload {
            psr4: [("Domain\\".to_string(), Psr4Paths::Single("src/".to_string()))]
                .into_iter()
                .collect(),
            files: vec![],
        };
        let r = SymbolResolver::new("/p", Some(&composer));
        assert_eq!(
            r.psr4_path("Domain\\Orders\\Order"),
            Some(PathBuf::from("/p/src/Orders/Order.php"))
        );
    }

    #[test]
    fn test_views_and_components() {
        let r = resolver();
        assert_eq!(
            r.resolve_view("products.index"),
            Some(PathBuf::from("/p/resources/views/products/index.blade.php"))
        );
        assert_eq!(r.resolve_view("mail::message"), None);
        assert_eq!(r.resolve_component("alert").len(), 2);
        assert_eq!(
            r.resolve_component("forms.input"),
            vec![PathBuf::from("/p/resources/views/components/forms/input.blade.php")]
        );
    }

    #[test]
    fn test_scripts() {
        let r = resolver();
        let from = Path::new("/p/resources/js/app.js");
        assert_eq!(
            r.resolve_script("./utils", from),
            Some(PathBuf::from("/p/resources/js/utils/index.js"))
        );
        assert_eq!(
            r.resolve_script("./cart", from),
            Some(PathBuf::from("/p/resources/js/cart.mjs"))
        );
        assert_eq!(
            r.resolve_script("@/app", Path::new("/p/x.js")),
            Some(PathBuf::from("/p/resources/js/app.js"))
        );
        assert_eq!(
            r.resolve_script("resources/css/app.css", Path::new("/p/resources/views/a.blade.php")),
            Some(PathBuf::from("/p/resources/css/app.css"))
        );
        assert_eq!(r.resolve_script("axios", from), None);
    }

    #[test]
    fn test_stylesheet_partials_and_assets() {
        let r = resolver();
        let from = Path::new("/p/resources/css/app.css");
        assert_eq!(
            r.resolve_stylesheet("buttons", from),
            Some(PathBuf::from("/p/resources/css/_buttons.scss"))
        );
        assert_eq!(
            r.resolve_asset("images/logo.png", Path::new("/p/resources/views/a.blade.php")),
            Some(PathBuf::from("/p/public/images/logo.png"))
        );
        assert_eq!(
            r.resolve_asset("../../img/LOGO.png", from),
            Some(PathBuf::from("/p/public/images/logo.png"))
        );
    }
}
