// function.rs — Process function payloads
//
// A Function is the user-supplied computation carried by Map-like and Comb
// processes. The middle-end never interprets it: it is an opaque value
// compared structurally over (name, parameters, return type, body).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value type of a parameter, return value, or port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_size: Option<usize>,
}

impl DataType {
    pub fn scalar(name: impl Into<String>) -> Self {
        DataType {
            name: name.into(),
            is_array: false,
            array_size: None,
        }
    }

    pub fn array(name: impl Into<String>, size: Option<usize>) -> Self {
        DataType {
            name: name.into(),
            is_array: true,
            array_size: size,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_array, self.array_size) {
            (false, _) => write!(f, "{}", self.name),
            (true, Some(n)) => write!(f, "{}[{}]", self.name, n),
            (true, None) => write!(f, "{}[]", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub is_const: bool,
}

/// A process function: signature plus opaque body text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: DataType,
    pub body: String,
}

impl Function {
    /// Single-input function `name(x: ty) -> ty { body }`.
    pub fn unary(name: impl Into<String>, ty: DataType, body: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            params: vec![Param {
                name: "x".to_string(),
                data_type: ty.clone(),
                is_const: true,
            }],
            return_type: ty,
            body: body.into(),
        }
    }

    /// Type consumed by the function (its first parameter).
    pub fn input_type(&self) -> Option<&DataType> {
        self.params.first().map(|p| &p.data_type)
    }

    pub fn output_type(&self) -> &DataType {
        &self.return_type
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if p.is_const {
                write!(f, "const ")?;
            }
            write!(f, "{}: {}", p.name, p.data_type)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(body: &str) -> Function {
        Function::unary("scale", DataType::scalar("float"), body)
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(f("return x * 2;"), f("return x * 2;"));
        assert_ne!(f("return x * 2;"), f("return x * 3;"));
    }

    #[test]
    fn const_qualifier_participates_in_equality() {
        let a = f("return x;");
        let mut b = a.clone();
        b.params[0].is_const = false;
        assert_ne!(a, b);
    }

    #[test]
    fn signature_display() {
        assert_eq!(f("").to_string(), "scale(const x: float) -> float");
        let arr = Function::unary("sum", DataType::array("int", Some(4)), "");
        assert_eq!(arr.to_string(), "sum(const x: int[4]) -> int[4]");
    }
}
