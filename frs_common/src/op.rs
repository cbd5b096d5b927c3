/// Implements operator traits for a single-field tuple struct by forwarding to the wrapped value.
///
/// ```ignore
/// op!(binary Cents: Add::add, Sub::sub);
/// op!(inplace Cents: AddAssign::add_assign);
/// op!(unary Cents: Neg::neg);
/// ```
/// The traits must be in scope where the macro is invoked.
#[macro_export]
macro_rules! op {
    (binary $wrapper:ident: $($op:ident::$op_fn:ident),+ $(,)?) => {
        $(
            impl $op for $wrapper {
                type Output = Self;

                fn $op_fn(self, rhs: Self) -> Self::Output {
                    Self($op::$op_fn(self.0, rhs.0))
                }
            }
        )+
    };

    (inplace $wrapper:ident: $($op:ident::$op_fn:ident),+ $(,)?) => {
        $(
            impl $op for $wrapper {
                fn $op_fn(&mut self, rhs: Self) {
                    $op::$op_fn(&mut self.0, rhs.0)
                }
            }
        )+
    };

    (unary $wrapper:ident: $($op:ident::$op_fn:ident),+ $(,)?) => {
        $(
            impl $op for $wrapper {
                type Output = Self;

                fn $op_fn(self) -> Self::Output {
                    Self($op::$op_fn(self.0))
                }
            }
        )+
    };
}
