//! Operator overloading for expression nodes
//!
//! `impl_expr_ops!([generics] Type)` gives a node type `+ - * / %` against
//! any expression of the same element type, plus unary `-`.

macro_rules! impl_expr_ops {
    ([$($gen:tt)*] $ty:ty) => {
        $crate::expr::impl_expr_ops!(@binary [$($gen)*] $ty, Add, add, AddOp);
        $crate::expr::impl_expr_ops!(@binary [$($gen)*] $ty, Sub, sub, SubOp);
        $crate::expr::impl_expr_ops!(@binary [$($gen)*] $ty, Mul, mul, MulOp);
        $crate::expr::impl_expr_ops!(@binary [$($gen)*] $ty, Div, div, DivOp);
        $crate::expr::impl_expr_ops!(@binary [$($gen)*] $ty, Rem, rem, RemOp);

        impl<$($gen)*> ::std::ops::Neg for $ty
        where
            $ty: $crate::expr::Expr,
        {
            type Output = $crate::expr::Unary<$ty, $crate::expr::NegOp>;

            fn neg(self) -> Self::Output {
                $crate::expr::Unary::new(self)
            }
        }
    };
    (@binary [$($gen:tt)*] $ty:ty, $trait:ident, $method:ident, $op:ident) => {
        impl<$($gen)*, Rhs> ::std::ops::$trait<Rhs> for $ty
        where
            $ty: $crate::expr::Expr,
            Rhs: $crate::expr::Expr<Elem = <$ty as $crate::expr::Expr>::Elem>,
        {
            type Output = $crate::expr::Binary<$ty, Rhs, $crate::expr::$op>;

            fn $method(self, rhs: Rhs) -> Self::Output {
                $crate::expr::Binary::new(self, rhs)
            }
        }
    };
}

pub(crate) use impl_expr_ops;

use crate::element::Element;
use crate::shape::Shape;
use crate::tensor::Tensor;

impl_expr_ops!(['a, T: Element, S: Shape] &'a Tensor<T, S>);
