use backtracie::host::{MethodDef, Runtime, Script, Value};
use backtracie::{Backtrace, Capabilities};

const SPEC_FILE: &str = "spec/unit/backtracie_spec.rb";

fn runtime() -> Runtime {
    Runtime::with_capabilities(Capabilities::default())
}

/// Capture the current thread from inside a block, the way
/// `Backtracie.backtrace_locations(Thread.current)` is usually called.
fn capture_current(cx: &Script) -> Backtrace {
    cx.backtracie_backtrace_locations(&cx.current_thread())
        .expect("current thread is a thread")
        .expect("current thread is alive")
}

fn names(backtrace: &Backtrace) -> Vec<&str> {
    backtrace
        .iter()
        .map(|location| location.qualified_method_name())
        .collect()
}

#[test]
fn module_method_is_type_level() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let module_c = cx.runtime().define_module("ModuleC");
        let hello = MethodDef::new(cx.runtime().singleton_owner(module_c), "hello", 12);
        cx.line(40);
        let block = cx.block();
        cx.call(&hello, Value::Module(module_c), |cx| {
            cx.yield_block(&block, capture_current)
        })
    });

    assert_eq!(
        names(&backtrace),
        vec![
            "Backtracie.backtrace_locations",
            "Object$<main>#{block}",
            "ModuleC.hello",
            "<main>"
        ]
    );
}

#[test]
fn method_defined_on_class_object() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let object = cx.runtime().well_known().object;
        let class = cx.runtime().define_class("ClassWithMethodDirectlyDefined", object);
        let method = MethodDef::new(cx.runtime().singleton_owner(class), "test_method", 5);
        let block = cx.block();
        cx.call(&method, Value::Module(class), |cx| {
            cx.yield_block(&block, capture_current)
        })
    });
    assert_eq!(
        backtrace[2].qualified_method_name(),
        "ClassWithMethodDirectlyDefined.test_method"
    );
}

#[test]
fn module_function_is_type_level() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let module = cx.runtime().define_module("ModuleWithFunction");
        let function = MethodDef::new(cx.runtime().singleton_owner(module), "test_function", 5);
        let block = cx.block();
        cx.call(&function, Value::Module(module), |cx| {
            cx.yield_block(&block, capture_current)
        })
    });
    assert_eq!(
        backtrace[2].qualified_method_name(),
        "ModuleWithFunction.test_function"
    );
}

#[test]
fn singleton_method_on_plain_object() {
    for expand_first in [false, true] {
        let runtime = runtime();
        let backtrace = runtime.run_main(SPEC_FILE, |cx| {
            let object_class = cx.runtime().well_known().object;
            let object = cx.runtime().new_object(object_class);
            if expand_first {
                cx.runtime().singleton_class(&object);
            }
            let owner = cx
                .runtime()
                .singleton_class(&object)
                .expect("objects have singleton classes");
            let method = MethodDef::new(owner, "test_method", 7);
            let block = cx.block();
            cx.call(&method, object, |cx| cx.yield_block(&block, capture_current))
        });
        assert_eq!(
            backtrace[2].qualified_method_name(),
            "Object$singleton#test_method"
        );
    }
}

#[test]
fn method_on_singleton_class_object() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let class = rt.define_class("ClassToGetASingletonMethodDefined", rt.well_known().object);
        let instance = rt.new_object(class);
        let singleton = rt.singleton_class(&instance).expect("singleton class");
        let method = MethodDef::new(rt.singleton_owner(singleton), "test_method", 9);
        let block = cx.block();
        cx.call(&method, Value::Module(singleton), |cx| {
            cx.yield_block(&block, capture_current)
        })
    });
    assert_eq!(
        backtrace[2].qualified_method_name(),
        "ClassToGetASingletonMethodDefined$singleton.test_method"
    );
}

#[test]
fn anonymous_subclass_of_value_class() {
    let runtime = runtime();
    let (plain, nested) = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let c1 = rt.anonymous_class(rt.well_known().array);
        let c2 = rt.anonymous_class(c1);
        let object = rt.new_object(c2);
        let method = MethodDef::new(c2, "test_method", 4);
        let array = rt.well_known().array;
        let block = cx.block();

        let plain = cx.call(&method, object.clone(), |cx| {
            cx.yield_block(&block, capture_current)
        });
        let nested = cx.call(&method, object, |cx| {
            let inner = cx.block();
            cx.native(Value::Nil, array, "map", |cx| {
                cx.yield_block(&inner, |cx| cx.yield_block(&block, capture_current))
            })
        });
        (plain, nested)
    });

    assert_eq!(plain[2].qualified_method_name(), "Array$anonymous#test_method");
    assert_eq!(
        names(&nested)[2..5],
        ["Array$anonymous#test_method{block}", "Array#map", "Array$anonymous#test_method"]
    );
}

#[test]
fn anonymous_class_and_module_names() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let class = rt.anonymous_class(rt.well_known().object);
        let module = rt.anonymous_module();
        let instance_hello = MethodDef::new(class, "hello", 3);
        let module_hello = MethodDef::new(rt.singleton_owner(module), "hello", 6);
        let instance = rt.new_object(class);
        cx.call(&instance_hello, instance, |cx| {
            cx.call(&module_hello, Value::Module(module), capture_current)
        })
    });
    assert_eq!(
        names(&backtrace)[1..3],
        ["Module$anonymous.hello", "Object$anonymous#hello"]
    );
}

#[test]
fn refinement_methods() {
    let runtime = runtime();
    let (plain, nested) = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let integer = rt.well_known().integer;
        let array = rt.well_known().array;
        let the_refinement = rt.define_module("TheRefinement");
        let refined = rt.refine(integer, the_refinement);
        let with_block = rt.define_module("TheRefinementWithABlock");
        let refined_with_block = rt.refine(integer, with_block);
        let block = cx.block();

        let plain = cx.call(&MethodDef::new(refined, "test_method", 3), Value::Integer(0), |cx| {
            cx.yield_block(&block, capture_current)
        });
        let method = MethodDef::new(refined_with_block, "test_method", 20);
        let nested = cx.call(&method, Value::Integer(0), |cx| {
            let inner = cx.block();
            cx.native(Value::Nil, array, "map", |cx| {
                cx.yield_block(&inner, |cx| cx.yield_block(&block, capture_current))
            })
        });
        (plain, nested)
    });

    assert_eq!(
        plain[2].qualified_method_name(),
        "Integer$refinement@TheRefinement#test_method"
    );
    assert_eq!(
        nested[2].qualified_method_name(),
        "Integer$refinement@TheRefinementWithABlock#test_method{block}"
    );
}

#[test]
fn refinement_without_metadata_is_anonymous() {
    let runtime = Runtime::with_capabilities(Capabilities {
        refinement_metadata: false,
        ..Capabilities::default()
    });
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let refined = rt.refine(rt.well_known().integer, rt.define_module("TheRefinement"));
        cx.call(
            &MethodDef::new(refined, "test_method", 3),
            Value::Integer(0),
            capture_current,
        )
    });
    assert_eq!(
        backtrace[1].qualified_method_name(),
        "Module$anonymous#test_method"
    );
}

#[test]
fn block_passed_three_levels_deep_has_one_suffix() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let class = rt.define_class("ClassWithMethod", rt.well_known().object);
        let integer = rt.well_known().integer;
        let method = MethodDef::new(class, "test_method", 2);
        let object = rt.new_object(class);
        let block = cx.block();
        cx.call(&method, object, |cx| {
            let level1 = cx.block();
            cx.native(Value::Integer(2), integer, "times", |cx| {
                cx.yield_block(&level1, |cx| {
                    let level2 = cx.block();
                    cx.yield_block(&level2, |cx| {
                        let level3 = cx.block();
                        cx.yield_block(&level3, |cx| cx.yield_block(&block, capture_current))
                    })
                })
            })
        })
    });

    let innermost = &backtrace[2];
    assert_eq!(innermost.qualified_method_name(), "ClassWithMethod#test_method{block}");
    assert_eq!(innermost.label(), "block (3 levels) in test_method");
    assert_eq!(innermost.base_label(), "test_method");
    assert_eq!(names(&backtrace)[5], "Integer#times");
}

#[test]
fn define_method_renders_like_a_nested_block() {
    let runtime = runtime();
    let (instance_level, type_level) = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let object = rt.well_known().object;
        let kernel = rt.well_known().kernel;
        let class = rt.define_class("ClassWithMethodDefinedUsingDefinedMethod", object);
        let singleton_host = rt.define_class("SingletonClassWithMethodDefinedUsingDefinedMethod", object);

        // class ... tap do define_method(:test_method) { ... } end end
        let defined = cx.class_body(class, |cx| {
            let tap = cx.block();
            cx.native(Value::Module(class), kernel, "tap", |cx| {
                cx.yield_block(&tap, |cx| cx.define_method(class, "test_method"))
            })
        });
        let singleton_owner = rt.singleton_owner(singleton_host);
        let defined_on_singleton = cx.class_body(singleton_owner, |cx| {
            cx.define_method(singleton_owner, "test_method")
        });

        let block = cx.block();
        let instance = rt.new_object(class);
        let instance_level = cx.call_defined(&defined, instance, |cx| {
            cx.yield_block(&block, capture_current)
        });
        let type_level = cx.call_defined(&defined_on_singleton, Value::Module(singleton_host), |cx| {
            cx.yield_block(&block, capture_current)
        });
        (instance_level, type_level)
    });

    assert_eq!(
        instance_level[2].qualified_method_name(),
        "ClassWithMethodDefinedUsingDefinedMethod#test_method{block}"
    );
    assert_eq!(
        instance_level[2].label(),
        "block (2 levels) in <class:ClassWithMethodDefinedUsingDefinedMethod>"
    );
    assert_eq!(
        type_level[2].qualified_method_name(),
        "SingletonClassWithMethodDefinedUsingDefinedMethod.test_method{block}"
    );
}

#[test]
fn module_body_and_blocks_inside_it() {
    let runtime = runtime();
    let (body, block_in_body) = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let array = rt.well_known().array;
        let module = rt.define_module("CapturingBacktraceFromInsideAModule");
        let other = rt.define_module("ToplevelModuleWithDefineMethodInIt");
        let block = cx.block();

        let body = cx.class_body(module, |cx| cx.yield_block(&block, capture_current));
        let block_in_body = cx.class_body(other, |cx| {
            let each = cx.block();
            cx.native(Value::Nil, array, "each", |cx| {
                cx.yield_block(&each, |cx| cx.yield_block(&block, capture_current))
            })
        });
        (body, block_in_body)
    });

    assert_eq!(
        body[2].qualified_method_name(),
        "CapturingBacktraceFromInsideAModule.{module exec}"
    );
    assert_eq!(body[2].label(), "<module:CapturingBacktraceFromInsideAModule>");
    assert_eq!(
        block_in_body[2].qualified_method_name(),
        "ToplevelModuleWithDefineMethodInIt.{module exec}{block}"
    );
}

#[test]
fn class_body_renders_class_exec() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let class = rt.define_class("ModuleB::ClassB", rt.well_known().object);
        cx.class_body(class, capture_current)
    });
    assert_eq!(backtrace[1].qualified_method_name(), "ModuleB::ClassB.{class exec}");
    assert_eq!(backtrace[1].label(), "<class:ClassB>");
}

#[test]
fn module_extended_hook() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let kernel = rt.well_known().kernel;
        let included = rt.define_module("ModuleToBeIncluded");
        let target = rt.define_module("ModuleToHaveIncludeApplied");
        let extended = MethodDef::new(rt.singleton_owner(included), "extended", 3);
        let block = cx.block();

        cx.class_body(target, |cx| {
            cx.native(Value::Module(target), kernel, "extend", |cx| {
                cx.call(&extended, Value::Module(included), |cx| {
                    cx.yield_block(&block, capture_current)
                })
            })
        })
    });

    assert_eq!(
        names(&backtrace)[2..5],
        [
            "ModuleToBeIncluded.extended",
            "ModuleToHaveIncludeApplied.extend",
            "ModuleToHaveIncludeApplied.{module exec}"
        ]
    );
}

#[test]
fn main_object_frames() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let object = rt.well_known().object;
        let proc_class = rt.well_known().proc_class;
        let top_level_hello = MethodDef::new(object, "top_level_hello", 30);
        let top_level_block = cx.block();
        let proc_object = rt.new_object(proc_class);

        cx.call(&top_level_hello, Value::Main, |cx| {
            let inner = cx.block();
            cx.native(proc_object, proc_class, "call", |cx| {
                cx.yield_block(&top_level_block, |cx| {
                    cx.eval(|cx| cx.yield_block(&inner, capture_current))
                })
            })
        })
    });

    assert_eq!(
        names(&backtrace),
        vec![
            "Backtracie.backtrace_locations",
            "Object#top_level_hello{block}",
            "Object$<main>#{block}",
            "Kernel#eval",
            "Object$<main>#{block}",
            "Proc#call",
            "Object#top_level_hello",
            "<main>"
        ]
    );
    assert_eq!(backtrace[2].path(), "(eval)");
    assert_eq!(backtrace[2].absolute_path(), None);
}

#[test]
fn eval_triggered_with_send() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let kernel = rt.well_known().kernel;
        let class = rt.define_class("EvalTriggeredWithSend", rt.well_known().object);
        let test_method = MethodDef::new(class, "test_method", 3).in_file(SPEC_FILE);
        let trigger_eval = MethodDef::new(class, "trigger_eval", 7);
        let object = rt.new_object(class);
        let block = cx.block();

        cx.call(&trigger_eval, object.clone(), |cx| {
            cx.native(object.clone(), kernel, "send", |cx| {
                cx.eval(|cx| {
                    cx.call(&test_method, object.clone(), |cx| {
                        cx.yield_block(&block, capture_current)
                    })
                })
            })
        })
    });

    assert_eq!(
        names(&backtrace)[2..7],
        [
            "EvalTriggeredWithSend#test_method",
            "EvalTriggeredWithSend#trigger_eval{block}",
            "Kernel#eval",
            "Kernel#send",
            "EvalTriggeredWithSend#trigger_eval"
        ]
    );
}

#[test]
fn instance_exec_on_object_without_method_entry() {
    let runtime = runtime();
    let backtrace = runtime.run_main(SPEC_FILE, |cx| {
        let rt = cx.runtime();
        let class = rt.define_class("ClassK", rt.well_known().object);
        let module = rt.define_module("ModuleK");
        let object = rt.new_object(class);
        let outer = cx.block();
        let inner = cx.block();
        cx.instance_exec(object, &outer, |cx| {
            cx.instance_exec(Value::Module(module), &inner, capture_current)
        })
    });

    assert_eq!(
        names(&backtrace)[1..5],
        [
            "ModuleK.{module exec}{block}",
            "ModuleK.instance_exec",
            "ClassK#{block}",
            "BasicObject#instance_exec"
        ]
    );
}
