// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::handle::Handled;
use crate::Data;
use crate::FixedArray;
use crate::HandleScope;
use crate::Local;

impl FixedArray {
  fn items(&self) -> std::rc::Rc<[Handled]> {
    match self.handled() {
      Handled::FixedArray(items) => items,
      _ => unreachable!("not a fixed array"),
    }
  }

  pub fn length(&self) -> usize {
    self.items().len()
  }

  /// Returns the element at `index`, or `None` past the end.
  pub fn get<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
    index: usize,
  ) -> Option<Local<'s, Data>> {
    let item = self.items().get(index)?.clone();
    Some(scope.new_local(item))
  }
}
