/*!
# Portable Types

Type references that survive serialization: every class is named by its
qualified name and type variables carry their bounds, so a compiled template
can be re-resolved against a different compilation's type oracle.
*/

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Qualified name of the root reference type.
pub const OBJECT: &str = "java.lang.Object";

/// A resolved or declared type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    /// A class, interface or primitive, with its type arguments
    Named { name: String, args: Vec<TypeRef> },
    /// A type variable
    Var(TypeVar),
}

/// A declared type variable with optional bounds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeVar {
    pub name: String,
    pub upper: Option<Box<TypeRef>>,
    pub lower: Option<Box<TypeRef>>,
}

impl TypeVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upper: None,
            lower: None,
        }
    }

    pub fn with_upper(mut self, bound: TypeRef) -> Self {
        self.upper = Some(Box::new(bound));
        self
    }

    pub fn with_lower(mut self, bound: TypeRef) -> Self {
        self.lower = Some(Box::new(bound));
        self
    }

    /// Bound-wise equality; the variable names are ignored.
    pub fn same_bounds(&self, other: &TypeVar) -> bool {
        fn bound_eq(a: &Option<Box<TypeRef>>, b: &Option<Box<TypeRef>>) -> bool {
            match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a.equivalent(b),
                // An explicit `Object` upper bound is the same as none.
                (Some(x), None) | (None, Some(x)) => x.is_named(OBJECT),
            }
        }
        bound_eq(&self.upper, &other.upper) && bound_eq(&self.lower, &other.lower)
    }
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args,
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        TypeRef::Var(TypeVar::new(name))
    }

    /// Qualified class name, `None` for type variables
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeRef::Named { name, .. } => Some(name),
            TypeRef::Var(_) => None,
        }
    }

    pub fn args(&self) -> &[TypeRef] {
        match self {
            TypeRef::Named { args, .. } => args,
            TypeRef::Var(_) => &[],
        }
    }

    pub fn is_named(&self, qualified: &str) -> bool {
        self.name() == Some(qualified)
    }

    pub fn is_var(&self) -> bool {
        matches!(self, TypeRef::Var(_))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Named { name, .. } if is_primitive_name(name))
    }

    /// Replaces bound type variables; unbound ones are kept as they are.
    pub fn substitute(&self, types: &BTreeMap<String, TypeRef>) -> TypeRef {
        match self {
            TypeRef::Named { name, args } => TypeRef::Named {
                name: name.clone(),
                args: args.iter().map(|arg| arg.substitute(types)).collect(),
            },
            TypeRef::Var(var) => match types.get(&var.name) {
                Some(bound) => bound.clone(),
                None => self.clone(),
            },
        }
    }

    /// Structural equality where type variables compare by their bounds.
    ///
    /// Two directions of a migration may close over "the same" variable under
    /// different names, so names cannot be relied upon.
    pub fn equivalent(&self, other: &TypeRef) -> bool {
        match (self, other) {
            (
                TypeRef::Named { name: a, args: aa },
                TypeRef::Named { name: b, args: ba },
            ) => {
                a == b
                    && aa.len() == ba.len()
                    && aa.iter().zip(ba).all(|(x, y)| x.equivalent(y))
            }
            (TypeRef::Var(a), TypeRef::Var(b)) => a.same_bounds(b),
            _ => false,
        }
    }

    pub fn mentions_var(&self) -> bool {
        match self {
            TypeRef::Named { args, .. } => args.iter().any(TypeRef::mentions_var),
            TypeRef::Var(_) => true,
        }
    }

    /// Renders with simple class names, as source code would spell it.
    pub fn to_source(&self) -> String {
        match self {
            TypeRef::Named { name, args } if args.is_empty() => simple_name(name).to_string(),
            TypeRef::Named { name, args } => format!(
                "{}<{}>",
                simple_name(name),
                args.iter()
                    .map(TypeRef::to_source)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeRef::Var(var) => var.name.clone(),
        }
    }

    /// Every qualified class name mentioned, for import bookkeeping
    pub fn class_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_class_names(&mut names);
        names
    }

    fn collect_class_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let TypeRef::Named { name, args } = self {
            if !is_primitive_name(name) {
                out.push(name);
            }
            for arg in args {
                arg.collect_class_names(out);
            }
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeRef::Var(var) => {
                write!(f, "{}", var.name)?;
                if let Some(upper) = &var.upper {
                    write!(f, " extends {upper}")?;
                }
                if let Some(lower) = &var.lower {
                    write!(f, " super {lower}")?;
                }
                Ok(())
            }
        }
    }
}

/// The last segment of a qualified name
pub fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

pub fn is_primitive_name(name: &str) -> bool {
    matches!(
        name,
        "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double" | "void"
    )
}

/// Type questions the engine cannot answer on its own.
///
/// Supplied by the front end that resolved the tree being scanned.
pub trait TypeOracle {
    /// Views `ty` as an instance of `class`, following declared supertypes.
    /// Returns the supertype with its arguments substituted, or `None` when
    /// `ty` is not a subtype of `class`.
    fn as_super(&self, ty: &TypeRef, class: &str) -> Option<TypeRef>;

    fn is_subtype(&self, sub: &TypeRef, sup: &TypeRef) -> bool {
        match sup {
            TypeRef::Named { name, .. } => self
                .as_super(sub, name)
                .is_some_and(|viewed| viewed.equivalent(sup) || sup.args().is_empty()),
            TypeRef::Var(_) => sub.equivalent(sup),
        }
    }

    /// Assignment conversion; subtyping unless the oracle knows better.
    fn is_convertible(&self, from: &TypeRef, to: &TypeRef) -> bool {
        self.is_subtype(from, to)
    }

    /// Whether a class referenced by a template exists in this environment
    fn can_resolve(&self, _class: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
struct ClassInfo {
    params: Vec<String>,
    supers: Vec<TypeRef>,
}

/// Table-backed [`TypeOracle`]
///
/// Holds declared classes with their type parameters and direct supertypes,
/// plus the primitive boxing table.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: HashMap<String, ClassInfo>,
    boxing: HashMap<String, String>,
    only_declared: bool,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `java.lang` core: `Object`, `String`, `Number` and the boxes
    pub fn java_lang() -> Self {
        let mut hierarchy = Self::new()
            .declare(OBJECT, &[], vec![])
            .declare("java.lang.CharSequence", &[], vec![])
            .declare(
                "java.lang.String",
                &[],
                vec![TypeRef::named("java.lang.CharSequence")],
            )
            .declare("java.lang.Number", &[], vec![]);
        for (primitive, boxed, numeric) in [
            ("boolean", "java.lang.Boolean", false),
            ("byte", "java.lang.Byte", true),
            ("char", "java.lang.Character", false),
            ("short", "java.lang.Short", true),
            ("int", "java.lang.Integer", true),
            ("long", "java.lang.Long", true),
            ("float", "java.lang.Float", true),
            ("double", "java.lang.Double", true),
        ] {
            let supers = if numeric {
                vec![TypeRef::named("java.lang.Number")]
            } else {
                vec![]
            };
            hierarchy = hierarchy.declare(boxed, &[], supers).boxes(primitive, boxed);
        }
        hierarchy
    }

    /// Declares a class with its type parameter names and direct supertypes.
    /// Supertypes may mention the class's own type parameters.
    pub fn declare(mut self, name: &str, params: &[&str], supers: Vec<TypeRef>) -> Self {
        self.classes.insert(
            name.to_string(),
            ClassInfo {
                params: params.iter().map(|p| p.to_string()).collect(),
                supers,
            },
        );
        self
    }

    pub fn boxes(mut self, primitive: &str, boxed: &str) -> Self {
        self.boxing.insert(primitive.to_string(), boxed.to_string());
        self
    }

    /// Makes [`TypeOracle::can_resolve`] answer only for declared classes.
    pub fn resolving_only_declared(mut self) -> Self {
        self.only_declared = true;
        self
    }

    fn boxed(&self, primitive: &str) -> Option<&str> {
        self.boxing.get(primitive).map(String::as_str)
    }

    fn unboxed(&self, boxed: &str) -> Option<&str> {
        self.boxing
            .iter()
            .find(|(_, b)| b.as_str() == boxed)
            .map(|(p, _)| p.as_str())
    }
}

impl TypeOracle for ClassHierarchy {
    fn as_super(&self, ty: &TypeRef, class: &str) -> Option<TypeRef> {
        let (name, args) = match ty {
            TypeRef::Named { name, args } => (name, args),
            TypeRef::Var(var) => {
                let upper = var
                    .upper
                    .as_deref()
                    .cloned()
                    .unwrap_or_else(|| TypeRef::named(OBJECT));
                return self.as_super(&upper, class);
            }
        };
        if name == class {
            return Some(ty.clone());
        }
        if let Some(info) = self.classes.get(name) {
            let subst: BTreeMap<String, TypeRef> = info
                .params
                .iter()
                .cloned()
                .zip(args.iter().cloned())
                .collect();
            for sup in &info.supers {
                if let Some(found) = self.as_super(&sup.substitute(&subst), class) {
                    return Some(found);
                }
            }
        }
        if class == OBJECT && !is_primitive_name(name) {
            return Some(TypeRef::named(OBJECT));
        }
        None
    }

    fn is_convertible(&self, from: &TypeRef, to: &TypeRef) -> bool {
        if self.is_subtype(from, to) {
            return true;
        }
        match (from.name(), to.name()) {
            (Some(f), Some(_)) if is_primitive_name(f) => self
                .boxed(f)
                .is_some_and(|boxed| self.is_subtype(&TypeRef::named(boxed), to)),
            (Some(f), Some(t)) if is_primitive_name(t) => self.unboxed(f) == Some(t),
            _ => false,
        }
    }

    fn can_resolve(&self, class: &str) -> bool {
        !self.only_declared || self.classes.contains_key(class) || is_primitive_name(class)
    }
}
