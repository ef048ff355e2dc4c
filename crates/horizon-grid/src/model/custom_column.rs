//! Derived columns declared as `Name=expression`.
//!
//! An expression is a single operand or `operand op operand`, where an operand
//! is a source column name or a literal (number or double-quoted string) and
//! `op` is one of `+ - * /`.

use crate::error::{GridError, Result};
use crate::model::value::{Column, ColumnType, Value, column_index};

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Column(usize),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CustomColumn {
    column: Column,
    left: Operand,
    right: Option<(Operator, Operand)>,
}

impl CustomColumn {
    /// Parses `definition` against the source columns.
    pub(crate) fn parse(definition: &str, source: &[Column]) -> Result<Self> {
        let invalid = || GridError::InvalidColumn(definition.to_string());
        let (name, expression) = definition.split_once('=').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() || column_index(source, name).is_some() {
            return Err(invalid());
        }

        let tokens: Vec<&str> = expression.split_whitespace().collect();
        let (left, right) = match tokens.as_slice() {
            [operand] => (parse_operand(operand, source)?, None),
            [left, op, right] => {
                let op = match *op {
                    "+" => Operator::Add,
                    "-" => Operator::Sub,
                    "*" => Operator::Mul,
                    "/" => Operator::Div,
                    _ => return Err(invalid()),
                };
                (
                    parse_operand(left, source)?,
                    Some((op, parse_operand(right, source)?)),
                )
            }
            _ => return Err(invalid()),
        };

        let column_type = match &right {
            None => operand_type(&left, source),
            Some((op, right)) => {
                let types = [operand_type(&left, source), operand_type(right, source)];
                if !types.iter().all(|t| t.is_numeric()) {
                    return Err(invalid());
                }
                if *op == Operator::Div || types.contains(&ColumnType::Double) {
                    ColumnType::Double
                } else {
                    ColumnType::Int
                }
            }
        };

        Ok(Self {
            column: Column::new(name, column_type).with_description(expression.trim()),
            left,
            right,
        })
    }

    pub(crate) fn column(&self) -> &Column {
        &self.column
    }

    /// Evaluates the column for one source row; `cell` reads source values.
    pub(crate) fn evaluate(&self, cell: impl Fn(usize) -> Value) -> Value {
        let read = |operand: &Operand| match operand {
            Operand::Column(index) => cell(*index),
            Operand::Literal(value) => value.clone(),
        };
        let left = read(&self.left);
        let Some((op, right)) = &self.right else {
            return left;
        };
        let right = read(right);
        match (&left, &right, op) {
            (Value::Int(a), Value::Int(b), Operator::Add) => a.checked_add(*b).map_or(Value::Null, Value::Int),
            (Value::Int(a), Value::Int(b), Operator::Sub) => a.checked_sub(*b).map_or(Value::Null, Value::Int),
            (Value::Int(a), Value::Int(b), Operator::Mul) => a.checked_mul(*b).map_or(Value::Null, Value::Int),
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => match op {
                    Operator::Add => Value::Double(a + b),
                    Operator::Sub => Value::Double(a - b),
                    Operator::Mul => Value::Double(a * b),
                    Operator::Div if b == 0.0 => Value::Null,
                    Operator::Div => Value::Double(a / b),
                },
                _ => Value::Null,
            },
        }
    }
}

fn parse_operand(token: &str, source: &[Column]) -> Result<Operand> {
    if let Some(index) = column_index(source, token) {
        return Ok(Operand::Column(index));
    }
    if let Ok(i) = token.parse::<i64>() {
        return Ok(Operand::Literal(Value::Int(i)));
    }
    if let Ok(d) = token.parse::<f64>() {
        return Ok(Operand::Literal(Value::Double(d)));
    }
    if let Some(text) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Ok(Operand::Literal(Value::String(text.to_string())));
    }
    Err(GridError::InvalidColumn(token.to_string()))
}

fn operand_type(operand: &Operand, source: &[Column]) -> ColumnType {
    match operand {
        Operand::Column(index) => source[*index].column_type,
        Operand::Literal(Value::Int(_)) => ColumnType::Int,
        Operand::Literal(Value::Double(_)) => ColumnType::Double,
        Operand::Literal(Value::Bool(_)) => ColumnType::Bool,
        Operand::Literal(_) => ColumnType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Vec<Column> {
        vec![
            Column::new("Qty", ColumnType::Int),
            Column::new("Px", ColumnType::Double),
            Column::new("Sym", ColumnType::String),
        ]
    }

    #[test]
    fn test_binary_expression() {
        let custom = CustomColumn::parse("Notional = Qty * Px", &source()).unwrap();
        assert_eq!(custom.column().name, "Notional");
        assert_eq!(custom.column().column_type, ColumnType::Double);

        let row = [Value::Int(3), Value::Double(2.5), Value::from("A")];
        assert_eq!(custom.evaluate(|i| row[i].clone()), Value::Double(7.5));
    }

    #[test]
    fn test_int_arithmetic_and_alias() {
        let doubled = CustomColumn::parse("Twice=Qty + Qty", &source()).unwrap();
        assert_eq!(doubled.column().column_type, ColumnType::Int);
        assert_eq!(doubled.evaluate(|_| Value::Int(4)), Value::Int(8));

        let alias = CustomColumn::parse("Ticker=Sym", &source()).unwrap();
        assert_eq!(alias.column().column_type, ColumnType::String);
        assert_eq!(alias.evaluate(|_| Value::from("X")), Value::from("X"));
    }

    #[test]
    fn test_division_by_zero_is_null() {
        let ratio = CustomColumn::parse("R=Qty / 0", &source()).unwrap();
        assert_eq!(ratio.evaluate(|_| Value::Int(1)), Value::Null);
    }

    #[test]
    fn test_rejects_invalid_definitions() {
        assert!(CustomColumn::parse("NoEquals", &source()).is_err());
        assert!(CustomColumn::parse("Qty=Px", &source()).is_err());
        assert!(CustomColumn::parse("X=Missing", &source()).is_err());
        assert!(CustomColumn::parse("X=Sym + Qty", &source()).is_err());
        assert!(CustomColumn::parse("X=Qty % 2", &source()).is_err());
    }
}
