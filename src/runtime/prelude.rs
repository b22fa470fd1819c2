//! The prelude module: `print` and the stdio streams.  It is the default
//! parent of loaded modules.

use crate::common::VmResult;
use crate::runtime::context::Context;
use crate::value::function;
use crate::value::module;
use crate::value::obj;
use crate::value::repr::Value;
use crate::value::stream;
use crate::value::string;
use crate::value::symbol;
use crate::value::tuple;
use crate::value::exception;

/// Build the prelude module.  Called once at context start-up.
pub(crate) fn create(z: &mut Context) -> Value {
    z.with_locals(2, |z, loc| {
        let prelude = module::new(z);
        loc.set(&mut z.locals, 0, prelude);

        let meta = function::meta_from_def(0, -1, 1).expect("print meta");
        let print_fn = function::new_native(z, meta, native_print);
        loc.set(&mut z.locals, 1, print_fn);
        let prelude = loc.get(&z.locals, 0);
        function::set_module(z, print_fn, prelude);
        let name = symbol::get(z, b"print");
        let prelude = loc.get(&z.locals, 0);
        let print_fn = loc.get(&z.locals, 1);
        module::set_var(z, prelude, name, print_fn);

        for (name, value) in [
            ("stdin", z.globals.stream_stdin),
            ("stdout", z.globals.stream_stdout),
            ("stderr", z.globals.stream_stderr),
        ] {
            let name_sym = symbol::get(z, name.as_bytes());
            let prelude = loc.get(&z.locals, 0);
            module::set_var(z, prelude, name_sym, value);
        }
        loc.get(&z.locals, 0)
    })
}

fn write_out(z: &mut Context, text: &str) -> VmResult {
    let out = z.globals.stream_stdout;
    if let Err(err) = stream::write_str(z, out, text) {
        let exc = exception::format(z, Some("io"), None, err.to_string());
        return Err(z.throw(exc));
    }
    Ok(())
}

/// `print(*values)`: write the string forms, space-separated, then newline.
fn native_print(z: &mut Context) -> VmResult {
    let count = tuple::length(z, z.reg(1));
    for i in 0..count {
        if i > 0 {
            write_out(z, " ")?;
        }
        // Re-read the tuple from its register: to_string may collect.
        let v = tuple::get(z, z.reg(1), i).expect("variadic tuple shrank");
        let s = obj::to_string(z, v)?;
        let text = string::to_utf8(z, s);
        write_out(z, &text)?;
    }
    write_out(z, "\n")?;
    let out = z.globals.stream_stdout;
    let _ = stream::flush(z, out);
    let nil = z.nil();
    z.set_reg0(nil);
    Ok(())
}
