//! The module loader: import by name over the module search path, compile,
//! initialise, and cache.  The loaded-module list lives in the global table
//! (a GC root); the name index here is a plain runtime table.

use std::path::{Path, PathBuf};

use log::debug;

use crate::back::codegen;
use crate::common::{Map, Name, VmResult};
use crate::runtime::context::Context;
use crate::value::array;
use crate::value::exception;
use crate::value::function;
use crate::value::module;
use crate::value::repr::Value;
use crate::value::stream;

/// File extension of kura source modules.
pub const SOURCE_EXT: &str = "kura";

pub struct ModuleLoader {
    search_path: Vec<PathBuf>,
    names: Map<Name, usize>,
}

impl ModuleLoader {
    pub fn new(search_path: Vec<PathBuf>) -> ModuleLoader {
        ModuleLoader { search_path, names: Map::new() }
    }

    pub fn add_search_path(&mut self, dir: PathBuf) {
        self.search_path.push(dir);
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .map(|dir| dir.join(format!("{name}.{SOURCE_EXT}")))
            .find(|p| p.is_file())
    }

    fn register(&mut self, name: &str, index: usize) {
        self.names.insert(Name::from(name.to_string()), index);
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.names.get(&Name::from(name.to_string())).copied()
    }
}

/// The already-loaded module registered under `name`, if any.
pub fn find_loaded(z: &Context, name: &str) -> Option<Value> {
    let index = z.loader.lookup(name)?;
    array::get(z, z.globals.loaded_modules, index)
}

/// Import a module by name.  A cached module is returned as-is; otherwise
/// the source file is resolved over the search path, compiled, initialised,
/// and cached.
pub fn import(z: &mut Context, name: &str) -> VmResult<Value> {
    if let Some(module) = find_loaded(z, name) {
        return Ok(module);
    }
    let Some(path) = z.loader.resolve(name) else {
        let exc = exception::format(z, Some("io"), None, format!("cannot find module {name}"));
        return Err(z.throw(exc));
    };
    import_file(z, name, &path)
}

/// Import a module from an explicit file path.
pub fn import_file(z: &mut Context, name: &str, path: &Path) -> VmResult<Value> {
    let input = match stream::open_file(z, path) {
        Ok(input) => input,
        Err(err) => {
            let exc = exception::format(
                z,
                Some("io"),
                None,
                format!("cannot open {}: {err}", path.display()),
            );
            return Err(z.throw(exc));
        }
    };
    debug!(target: "kura::loader", "importing {name} from {}", path.display());
    import_stream(z, name, input)
}

/// Import a module from in-memory source text.
pub fn import_source(z: &mut Context, name: &str, source: &str) -> VmResult<Value> {
    if let Some(module) = find_loaded(z, name) {
        return Ok(module);
    }
    let input = stream::new_bytes(z, source.as_bytes().to_vec());
    import_stream(z, name, input)
}

fn import_stream(z: &mut Context, name: &str, input: Value) -> VmResult<Value> {
    z.with_locals(2, |z, loc| {
        let init_fn = codegen::compile_source(z, input)?;
        loc.set(&mut z.locals, 0, init_fn);
        let module = module::new(z);
        loc.set(&mut z.locals, 1, module);
        let prelude = z.globals.mod_prelude;
        if prelude.is_object() {
            module::add_parent(z, module, prelude);
        }
        let init_fn = loc.get(&z.locals, 0);
        let module = loc.get(&z.locals, 1);
        function::set_module(z, init_fn, module);
        module::set_init_function(z, module, init_fn);
        let module = loc.get(&z.locals, 1);
        module::do_init(z, module)?;

        let module = loc.get(&z.locals, 1);
        let list = z.globals.loaded_modules;
        array::append(z, list, module);
        let index = array::length(z, z.globals.loaded_modules) - 1;
        z.loader.register(name, index);
        Ok(loc.get(&z.locals, 1))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::symbol;

    #[test]
    fn importing_twice_returns_the_same_module() {
        let mut z = Context::for_tests();
        let a = import_source(&mut z, "demo", "x = 1\n").unwrap();
        let b = import_source(&mut z, "demo", "x = 1\n").unwrap();
        assert_eq!(a, b);
        assert!(module::is_module(&z, a));
        assert_eq!(find_loaded(&z, "demo"), Some(a));
        assert_eq!(find_loaded(&z, "other"), None);
    }

    #[test]
    fn missing_module_raises_io() {
        let mut z = Context::for_tests();
        let err = import(&mut z, "no_such_module");
        assert!(err.is_err());
        let exc = z.reg0();
        let kind = exception::kind(&z, exc);
        assert_eq!(symbol::bytes(&z, kind), b"io");
    }

    #[test]
    fn bad_source_raises_syntax() {
        let mut z = Context::for_tests();
        let err = import_source(&mut z, "broken", "\"unterminated\n");
        assert!(err.is_err());
        let exc = z.reg0();
        let kind = exception::kind(&z, exc);
        assert_eq!(symbol::bytes(&z, kind), b"syntax");
    }
}
