use clap::Parser;

use anders_rs::andersen::{AnalysisConfig, Andersen};
use anders_rs::ir::{Callee, Init, Module, Operand, Param, Statement, ValueRef};

#[derive(Debug, Parser)]
#[command(author, version, about = "Andersen points-to analysis demo")]
struct Cli {
    /// Disable offline constraint optimization (HVN).
    #[clap(long)]
    no_hvn: bool,

    /// Disable hybrid cycle detection.
    #[clap(long)]
    no_hcd: bool,

    /// Disable lazy cycle detection.
    #[clap(long)]
    no_lcd: bool,

    /// Print the collected constraints, one per line.
    #[clap(long)]
    dump_constraints: bool,

    /// Print the solved points-to sets, one node per line.
    #[clap(long)]
    dump_result: bool,

    /// Verbose solver logging.
    #[clap(long)]
    verbose: bool,
}

/// Values of the demo program we want to query afterwards.
struct Demo {
    module: Module,
    buf_a: ValueRef,
    buf_b: ValueRef,
    stack_ptr: ValueRef,
    heap_ptr: ValueRef,
    loaded: ValueRef,
    forwarded: ValueRef,
    indirect_result: ValueRef,
}

/// Builds a small program exercising the interesting statement kinds:
///
/// ```c
/// int buf_a, buf_b;
/// int *table = &buf_a;
/// int *id(int *p) { return p; }
///
/// int main(void) {
///     int *sp = &<stack slot>;
///     int *hp = malloc(...);
///     int *loaded = table;        /* reads &buf_a */
///     int *forwarded = id(sp);
///     int *(*fp)(int *) = id;
///     int *indirect_result = fp(hp);
/// }
/// ```
fn build_demo() -> Demo {
    let mut module = Module::new();

    let buf_a = module.add_global(Init::Scalar, false);
    let buf_b = module.add_global(Init::Scalar, false);
    let table = module.add_global(Init::Global(buf_a), false);

    let malloc = module.add_function("malloc");
    {
        let f = module.function_mut(malloc);
        f.is_external = true;
        f.returns_pointer = true;
    }

    let id = module.add_function("id");
    let id_param = module.fresh_value();
    {
        let f = module.function_mut(id);
        f.is_address_taken = true;
        f.returns_pointer = true;
        f.params.push(Param {
            value: id_param,
            is_pointer: true,
        });
        f.body.push(Statement::Return {
            value: Operand::Value(id_param),
        });
    }
    let id_value = module.function(id).value;

    let main = module.add_function("main");
    let stack_ptr = module.fresh_value();
    let heap_ptr = module.fresh_value();
    let loaded = module.fresh_value();
    let forwarded = module.fresh_value();
    let fp = module.fresh_value();
    let indirect_result = module.fresh_value();
    module.function_mut(main).body = vec![
        Statement::Alloca { dst: stack_ptr },
        Statement::Call {
            dst: Some(heap_ptr),
            callee: Callee::Direct(malloc),
            args: vec![Operand::NonPointer],
        },
        Statement::Load {
            dst: loaded,
            addr: table,
        },
        Statement::Call {
            dst: Some(forwarded),
            callee: Callee::Direct(id),
            args: vec![Operand::Value(stack_ptr)],
        },
        Statement::Assign {
            dst: fp,
            srcs: vec![Operand::Value(id_value)],
        },
        Statement::Call {
            dst: Some(indirect_result),
            callee: Callee::Indirect(fp),
            args: vec![Operand::Value(heap_ptr)],
        },
    ];

    Demo {
        module,
        buf_a,
        buf_b,
        stack_ptr,
        heap_ptr,
        loaded,
        forwarded,
        indirect_result,
    }
}

fn print_points_to(anders: &Andersen, name: &str, v: ValueRef) {
    match anders.points_to(v) {
        Some(targets) => {
            let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
            println!("points_to({name}) = {{{}}}", targets.join(", "));
        }
        None => println!("points_to({name}) = <unknown>"),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        if args.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let config = AnalysisConfig {
        enable_hvn: !args.no_hvn,
        enable_hcd: !args.no_hcd,
        enable_lcd: !args.no_lcd,
        dump_constraints: args.dump_constraints,
        dump_result: args.dump_result,
        dump_debug: args.verbose,
    };
    println!("config = {:?}", config);

    let demo = build_demo();
    let mut anders = Andersen::new(config);
    anders.run(&demo.module);

    print_points_to(&anders, "stack_ptr", demo.stack_ptr);
    print_points_to(&anders, "heap_ptr", demo.heap_ptr);
    print_points_to(&anders, "loaded", demo.loaded);
    print_points_to(&anders, "forwarded", demo.forwarded);
    print_points_to(&anders, "indirect_result", demo.indirect_result);

    println!(
        "alias(loaded, buf_a's address holder) = {:?}",
        anders.alias(demo.loaded, demo.buf_a)
    );
    println!(
        "alias(forwarded, stack_ptr) = {:?}",
        anders.alias(demo.forwarded, demo.stack_ptr)
    );
    println!(
        "alias(indirect_result, heap_ptr) = {:?}",
        anders.alias(demo.indirect_result, demo.heap_ptr)
    );
    println!(
        "alias(stack_ptr, heap_ptr) = {:?}",
        anders.alias(demo.stack_ptr, demo.heap_ptr)
    );
    println!(
        "alias(loaded, buf_b holder) = {:?}",
        anders.alias(demo.loaded, demo.buf_b)
    );

    println!("allocation sites: {}", anders.all_allocation_sites().len());

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
