//! Fixture implementations shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use equivalence_engine::prelude::*;
use equivalence_engine::resource::filesystem::NOT_FOUND;

/// Engine config for tests: small random tail, fixed seed.
pub fn config(parallelism: usize) -> Config {
    let mut config = Config::default();
    config.generation.seed = 124;
    config.generation.random_cases = 96;
    config.execution.parallelism = parallelism;
    config
}

pub fn engine(contract: Contract, reference: impl Implementation + 'static, config: Config) -> Engine {
    Engine::new(Arc::new(contract), Arc::new(reference), config).expect("engine should validate")
}

// ──────────────────── calculator (static operations) ────────────────────

/// How a [`Calc`] deviates from the reference behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcFlavor {
    Reference,
    /// `add(2, 3)` returns 42.
    WrongSum,
    /// Division by zero raises the same kind with another message.
    Reworded,
    /// Division by zero raises a different kind.
    OtherKind,
    /// `neg` is wrong for a band of inputs only random cases reach.
    RandomBand,
}

#[derive(Debug, Clone, Copy)]
pub struct Calc {
    pub label: &'static str,
    pub flavor: CalcFlavor,
}

impl Calc {
    pub const fn reference() -> Self {
        Self {
            label: "reference",
            flavor: CalcFlavor::Reference,
        }
    }

    pub const fn candidate(flavor: CalcFlavor) -> Self {
        Self {
            label: "candidate",
            flavor,
        }
    }
}

pub fn calc_surface() -> Surface {
    Surface::new()
        .with(Signature::static_op("add", vec![TypeDesc::Int, TypeDesc::Int], TypeDesc::Long))
        .with(
            Signature::static_op("div", vec![TypeDesc::Int, TypeDesc::Int], TypeDesc::Int)
                .raises(["DivideByZero"]),
        )
        .with(Signature::static_op("neg", vec![TypeDesc::Int], TypeDesc::Long))
}

impl Implementation for Calc {
    fn label(&self) -> &str {
        self.label
    }

    fn describe(&self) -> Surface {
        calc_surface()
    }

    fn invoke(
        &self,
        op: &Signature,
        _receiver: Option<&mut dyn Receiver>,
        args: &mut [Value],
        _resources: &mut Resources,
    ) -> std::result::Result<Value, Raised> {
        let int = |i: usize| args.get(i).and_then(Value::as_int).unwrap_or_default();
        match op.name.as_str() {
            "add" => {
                let (a, b) = (int(0), int(1));
                if self.flavor == CalcFlavor::WrongSum && (a, b) == (2, 3) {
                    return Ok(Value::Int(42));
                }
                Ok(Value::Int(a + b))
            }
            "div" => {
                let (a, b) = (int(0), int(1));
                if b == 0 {
                    return Err(match self.flavor {
                        CalcFlavor::Reworded => Raised::failure("DivideByZero", "attempt to divide by zero"),
                        CalcFlavor::OtherKind => Raised::failure("ArithmeticError", "division by zero"),
                        _ => Raised::failure("DivideByZero", "division by zero"),
                    });
                }
                Ok(Value::Int(a.wrapping_div(b)))
            }
            "neg" => {
                let x = int(0);
                if self.flavor == CalcFlavor::RandomBand && (1_000..1_000_000).contains(&x) {
                    return Ok(Value::Int(x));
                }
                Ok(Value::Int(-x))
            }
            other => Err(Raised::failure("Unsupported", other.to_string())),
        }
    }
}

/// Calculator contract with fixed tuples for `add`.
pub fn calc_contract() -> Contract {
    ContractBuilder::new(&Calc::reference())
        .fixed_tuples(
            Scope::operations(["add"]),
            vec![TypeDesc::Int, TypeDesc::Int],
            vec![
                vec![Value::Int(2), Value::Int(3)],
                vec![Value::Int(10), Value::Int(-4)],
            ],
        )
        .build()
        .expect("calculator contract builds")
}

// ──────────────────── counter (receiver state) ────────────────────

#[derive(Debug)]
pub struct Count(pub i64);

impl Receiver for Count {
    fn state(&self) -> Value {
        Value::Int(self.0)
    }
}

/// A counter whose `increment` steps by `step`.
#[derive(Debug, Clone, Copy)]
pub struct Counter {
    pub label: &'static str,
    pub step: i64,
}

pub fn counter_surface() -> Surface {
    Surface::new()
        .with(Signature::constructor("new", vec![TypeDesc::Int]))
        .with(Signature::bound("increment", vec![], TypeDesc::Unit))
        .with(Signature::bound("get", vec![], TypeDesc::Long))
}

impl Implementation for Counter {
    fn label(&self) -> &str {
        self.label
    }

    fn describe(&self) -> Surface {
        counter_surface()
    }

    fn construct(
        &self,
        _op: &Signature,
        args: &mut [Value],
        _resources: &mut Resources,
    ) -> std::result::Result<Box<dyn Receiver>, Raised> {
        let start = args.first().and_then(Value::as_int).unwrap_or_default();
        Ok(Box::new(Count(start)))
    }

    fn invoke(
        &self,
        op: &Signature,
        receiver: Option<&mut dyn Receiver>,
        _args: &mut [Value],
        _resources: &mut Resources,
    ) -> std::result::Result<Value, Raised> {
        let count = receiver
            .and_then(|r| r.downcast_mut::<Count>())
            .ok_or_else(|| Raised::failure("IllegalState", "no counter"))?;
        match op.name.as_str() {
            "increment" => {
                count.0 += self.step;
                Ok(Value::Null)
            }
            "get" => Ok(Value::Int(count.0)),
            other => Err(Raised::failure("Unsupported", other.to_string())),
        }
    }
}

pub fn counter_contract() -> Contract {
    ContractBuilder::new(&Counter {
        label: "reference",
        step: 1,
    })
    .build()
    .expect("counter contract builds")
}

// ──────────────────── greeter (virtual filesystem) ────────────────────

/// Reads `/testing.txt`, `reads` times in a row, concatenated.
#[derive(Debug, Clone, Copy)]
pub struct Greeter {
    pub label: &'static str,
    pub reads: usize,
}

pub const GREETING_PATH: &str = "/testing.txt";

pub fn greeter_surface() -> Surface {
    Surface::new().with(Signature::static_op("read_greeting", vec![], TypeDesc::Str).raises([NOT_FOUND]))
}

impl Implementation for Greeter {
    fn label(&self) -> &str {
        self.label
    }

    fn describe(&self) -> Surface {
        greeter_surface()
    }

    fn invoke(
        &self,
        _op: &Signature,
        _receiver: Option<&mut dyn Receiver>,
        _args: &mut [Value],
        resources: &mut Resources,
    ) -> std::result::Result<Value, Raised> {
        let fs = resources
            .filesystem()
            .ok_or_else(|| Raised::failure("IllegalState", "no filesystem"))?;
        let mut text = String::new();
        for _ in 0..self.reads {
            text.push_str(&fs.read_to_string(GREETING_PATH)?);
        }
        Ok(Value::Str(text))
    }
}

pub fn greeter_contract() -> Contract {
    ContractBuilder::new(&Greeter {
        label: "reference",
        reads: 1,
    })
    .resource_provider(FilesystemProvider)
    .provide_resource("read_greeting", FILESYSTEM)
    .fixed(
        TypeDesc::named(FILESYSTEM),
        [VirtualFilesystem::new()
            .with_file(GREETING_PATH, "Hello, world!")
            .to_value()],
    )
    .build()
    .expect("greeter contract builds")
}

// ──────────────────── tokens (always-skipping generator) ────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Echo;

pub fn token_type() -> TypeDesc {
    TypeDesc::named("Token")
}

impl Implementation for Echo {
    fn describe(&self) -> Surface {
        Surface::new()
            .with(Signature::static_op("echo", vec![token_type()], TypeDesc::Str))
            .with(Signature::static_op("len", vec![TypeDesc::Str], TypeDesc::Int))
    }

    fn invoke(
        &self,
        op: &Signature,
        _receiver: Option<&mut dyn Receiver>,
        args: &mut [Value],
        _resources: &mut Resources,
    ) -> std::result::Result<Value, Raised> {
        match op.name.as_str() {
            "echo" => Ok(Value::str(args[0].to_string())),
            _ => {
                let len = args[0].as_str().map_or(0, str::len);
                Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
            }
        }
    }
}

pub fn token_contract() -> Contract {
    ContractBuilder::new(&Echo)
        .random(token_type(), |_: Complexity, _: &mut rand::rngs::StdRng| Generated::Skip)
        .build()
        .expect("token contract builds")
}

// ──────────────────── factory counter (factory vs constructor) ────────────────────

/// A [`Counter`] built through a static `new` factory instead of a constructor.
#[derive(Debug, Clone, Copy)]
pub struct FactoryCounter {
    pub step: i64,
}

impl Implementation for FactoryCounter {
    fn label(&self) -> &str {
        "factory"
    }

    fn describe(&self) -> Surface {
        Surface::new()
            .with(Signature::static_op("new", vec![TypeDesc::Int], TypeDesc::Receiver))
            .with(Signature::bound("increment", vec![], TypeDesc::Unit))
            .with(Signature::bound("get", vec![], TypeDesc::Long))
    }

    fn construct(
        &self,
        op: &Signature,
        args: &mut [Value],
        resources: &mut Resources,
    ) -> std::result::Result<Box<dyn Receiver>, Raised> {
        self.counter().construct(op, args, resources)
    }

    fn invoke(
        &self,
        op: &Signature,
        receiver: Option<&mut dyn Receiver>,
        args: &mut [Value],
        resources: &mut Resources,
    ) -> std::result::Result<Value, Raised> {
        self.counter().invoke(op, receiver, args, resources)
    }
}

impl FactoryCounter {
    const fn counter(self) -> Counter {
        Counter {
            label: "factory",
            step: self.step,
        }
    }
}

/// Counter contract that lets `new` match a receiver factory.
pub fn factory_counter_contract() -> Contract {
    ContractBuilder::new(&Counter {
        label: "reference",
        step: 1,
    })
    .designate_factory("new")
    .build()
    .expect("factory counter contract builds")
}

// ──────────────────── summer (argument mutation) ────────────────────

/// Sums a list; the `clears` variant empties its argument afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Summer {
    pub clears: bool,
}

pub fn summer_surface() -> Surface {
    Surface::new().with(Signature::static_op(
        "sum",
        vec![TypeDesc::list(TypeDesc::Int)],
        TypeDesc::Long,
    ))
}

impl Implementation for Summer {
    fn describe(&self) -> Surface {
        summer_surface()
    }

    fn invoke(
        &self,
        _op: &Signature,
        _receiver: Option<&mut dyn Receiver>,
        args: &mut [Value],
        _resources: &mut Resources,
    ) -> std::result::Result<Value, Raised> {
        let Some(items) = args.first_mut().and_then(Value::as_list_mut) else {
            return Err(Raised::failure("IllegalArgument", "expected a list"));
        };
        let total = items
            .iter()
            .filter_map(Value::as_int)
            .fold(0_i64, i64::wrapping_add);
        if self.clears {
            items.clear();
        }
        Ok(Value::Int(total))
    }
}

pub fn summer_contract(cheap_lists: bool) -> Contract {
    let builder = ContractBuilder::new(&Summer { clears: false });
    let builder = if cheap_lists {
        builder.cheap_copy(TypeDesc::list(TypeDesc::Int))
    } else {
        builder
    };
    builder.build().expect("summer contract builds")
}

// ──────────────────── volatile resource (provider panics) ────────────────────

pub const VOLATILE: &str = "volatile";

/// Provider that panics when asked to build a resource from negative content.
#[derive(Debug, Clone, Copy)]
pub struct VolatileProvider;

#[derive(Debug)]
pub struct Volatile(pub i64);

impl Resource for Volatile {
    fn snapshot(&self) -> Value {
        Value::Int(self.0)
    }
}

impl ResourceProvider for VolatileProvider {
    fn name(&self) -> &str {
        VOLATILE
    }

    fn content_type(&self) -> TypeDesc {
        TypeDesc::named(VOLATILE)
    }

    fn instantiate(&self, content: &Value) -> Result<Box<dyn Resource>> {
        let level = content.as_int().unwrap_or_default();
        assert!(level >= 0, "volatile resource exploded at {level}");
        Ok(Box::new(Volatile(level)))
    }

    fn simple_contents(&self) -> Vec<Value> {
        vec![Value::Int(1), Value::Int(-1), Value::Int(2)]
    }

    fn random_content(&self, complexity: Complexity, rng: &mut rand::rngs::StdRng) -> Option<Value> {
        use rand::Rng;
        Some(Value::Int(rng.random_range(-1..=i64::from(complexity.level()))))
    }
}

/// Reports the volatile level it was given.
#[derive(Debug, Clone, Copy)]
pub struct Gauge;

impl Implementation for Gauge {
    fn describe(&self) -> Surface {
        Surface::new().with(Signature::static_op("level", vec![], TypeDesc::Long))
    }

    fn invoke(
        &self,
        _op: &Signature,
        _receiver: Option<&mut dyn Receiver>,
        _args: &mut [Value],
        resources: &mut Resources,
    ) -> std::result::Result<Value, Raised> {
        let volatile = resources
            .get::<Volatile>(VOLATILE)
            .ok_or_else(|| Raised::failure("IllegalState", "no volatile resource"))?;
        Ok(Value::Int(volatile.0))
    }
}

pub fn gauge_contract() -> Contract {
    ContractBuilder::new(&Gauge)
        .resource_provider(VolatileProvider)
        .provide_resource("level", VOLATILE)
        .build()
        .expect("gauge contract builds")
}
